pub mod author;
pub mod config;
pub mod reconcile;
pub mod scheduler;
pub mod search;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use author::{get_author_info, AuthorError, AuthorInfo, ChildPageInfo};
pub use config::{load_config, read_config, write_config, ConfigError, ConfigOverrides, DaemonConfig};
pub use reconcile::{
    should_process, ItemErrorKind, ItemFailure, ReconciliationOutcome, ReconciliationRun,
    RunFailure, RunState,
};
pub use scheduler::{run_scheduler, trigger_once, ScheduleConfig, SchedulerMetrics, SchedulerSnapshot};
pub use search::{search_pages, SearchError, SearchResult, SearchResults};
pub use store::{
    ContentItem, ContentQuery, ContentStore, FsContentStore, InMemoryContentStore, PropertyValue,
    ServiceIdentity, StoreSession,
};
pub use utils::ContentPath;
