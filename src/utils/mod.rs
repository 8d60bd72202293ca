mod path;

pub use path::{ContentPath, PathError};

/// Name of the file holding an item's properties in the filesystem store
pub const ITEM_FILE: &str = ".content.json";

/// Default root under which published pages are searched
pub const DEFAULT_CONTENT_PATH: &str = "/content";

/// Default debounce window in seconds (2 minutes)
pub const DEFAULT_DEBOUNCE_WINDOW_SECS: u64 = 120;

/// Default trigger interval in seconds (every 2 minutes)
pub const DEFAULT_INTERVAL_SECS: u64 = 120;

/// Default service identity used to open store sessions
pub const DEFAULT_SERVICE_USER: &str = "reconciler-service";

/// Root of the user profile tree
pub const USER_HOME_ROOT: &str = "/home/users";

/// Property names understood by the daemon
pub mod property {
    /// Replication marker: present once an item has been published
    pub const LAST_REPLICATED: &str = "lastReplicated";
    /// Last time the item was reconciled
    pub const PROCESSED_AT: &str = "processedAt";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const LAST_MODIFIED: &str = "lastModified";
    pub const LAST_MODIFIED_BY: &str = "lastModifiedBy";
    pub const IMAGE_REFERENCE: &str = "imageReference";
    pub const GIVEN_NAME: &str = "givenName";
    pub const FAMILY_NAME: &str = "familyName";
}
