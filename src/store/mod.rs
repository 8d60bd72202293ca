//! Content store client.
//!
//! The reconciler talks to the content tree through two traits:
//! [`ContentStore`] hands out sessions for a service identity, and
//! [`StoreSession`] carries reads, staged writes and the batch commit.
//! Writes staged through a session are visible to that session's reads
//! and become durable only on [`StoreSession::commit`].

mod fs;
mod memory;
mod query;
mod types;

pub use fs::FsContentStore;
pub use memory::InMemoryContentStore;
pub use query::{escape_literal, ContentQuery, Predicate};
pub use types::{ContentItem, PropertyError, PropertyValue, ServiceIdentity};

use async_trait::async_trait;
use thiserror::Error;

/// A session could not be obtained
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Service user '{0}' is not authorized")]
    Unauthorized(String),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
}

/// A read or query could not be executed
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Session is closed")]
    SessionClosed,
}

/// A single staged write was rejected
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Item {0} not found")]
    ItemNotFound(String),

    #[error("Item {0} is read-only")]
    ReadOnly(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Session is closed")]
    SessionClosed,
}

/// The batch commit failed; nothing staged was applied
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Item {0} disappeared before commit")]
    ItemVanished(String),

    #[error("Commit failed and could not be undone for {applied:?}: {source}")]
    PartiallyApplied {
        applied: Vec<String>,
        source: std::io::Error,
    },

    #[error("Session is closed")]
    SessionClosed,
}

/// Factory for store sessions
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Open a connection on behalf of `identity`.
    async fn connect(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Box<dyn StoreSession>, ConnectionError>;
}

/// One exclusively owned connection with its transactional scope
#[async_trait]
pub trait StoreSession: Send {
    /// Obtain the transactional scope. The connection still has to be
    /// released if this fails.
    async fn begin(&mut self) -> Result<(), ConnectionError>;

    /// All items strictly below the query root that match every predicate.
    async fn query(&mut self, query: &ContentQuery) -> Result<Vec<ContentItem>, QueryError>;

    async fn get_item(&mut self, path: &str) -> Result<Option<ContentItem>, QueryError>;

    /// Direct children of `path`, in name order
    async fn list_children(&mut self, path: &str) -> Result<Vec<ContentItem>, QueryError>;

    /// Validate the target and stage the write until commit.
    async fn set_property(
        &mut self,
        path: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), MutationError>;

    /// Apply every staged write as one batch. Staged writes are dropped
    /// whether or not the commit succeeds.
    async fn commit(&mut self) -> Result<(), CommitError>;

    /// Close the session, discarding anything uncommitted. Idempotent.
    async fn release(&mut self);
}

/// Staged writes per item path
pub(crate) type PendingWrites =
    std::collections::BTreeMap<String, std::collections::BTreeMap<String, PropertyValue>>;

/// Apply a session's staged writes to an item it read
pub(crate) fn overlay_pending(mut item: ContentItem, pending: &PendingWrites) -> ContentItem {
    if let Some(props) = pending.get(&item.path) {
        for (name, value) in props {
            item.properties.insert(name.clone(), value.clone());
        }
    }
    item
}
