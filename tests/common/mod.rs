#![allow(dead_code)]

use async_trait::async_trait;
use pagestamp_daemon::store::{
    CommitError, ConnectionError, ContentItem, ContentQuery, ContentStore, InMemoryContentStore,
    MutationError, PropertyValue, QueryError, ServiceIdentity, StoreSession,
};
use pagestamp_daemon::utils::{property, ITEM_FILE};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// A published page with no processed timestamp
pub fn published(path: &str) -> ContentItem {
    ContentItem::new(path).with_property(property::LAST_REPLICATED, "2024-05-01T00:00:00Z")
}

/// Directory backing `path` under a filesystem store root
pub fn item_dir(root: &Path, path: &str) -> PathBuf {
    path.trim_start_matches('/')
        .split('/')
        .fold(root.to_path_buf(), |acc, s| acc.join(s))
}

/// Write an item file into a filesystem store
pub async fn write_item(root: &Path, path: &str, properties: serde_json::Value) {
    let dir = item_dir(root, path);
    tokio::fs::create_dir_all(&dir)
        .await
        .expect("Failed to create item dir");
    tokio::fs::write(
        dir.join(ITEM_FILE),
        serde_json::to_string_pretty(&properties).expect("Failed to encode item"),
    )
    .await
    .expect("Failed to write item");
}

/// Read an item file back as raw JSON
pub async fn read_item(root: &Path, path: &str) -> serde_json::Value {
    let content = tokio::fs::read_to_string(item_dir(root, path).join(ITEM_FILE))
        .await
        .expect("Failed to read item");
    serde_json::from_str(&content).expect("Failed to parse item")
}

/// Calls observed by a [`FaultyStore`]
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub releases: AtomicUsize,
    pub queries: AtomicUsize,
    pub set_property_calls: AtomicUsize,
    pub commits: AtomicUsize,
}

impl Counters {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn set_property_calls(&self) -> usize {
        self.set_property_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// Failures to inject, switchable between runs
#[derive(Debug, Default)]
pub struct Faults {
    pub fail_connect: AtomicBool,
    pub fail_begin: AtomicBool,
    pub fail_query: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_mutation: Mutex<HashSet<String>>,
}

impl Faults {
    pub fn fail_mutation_on(&self, path: &str) {
        self.fail_mutation.lock().unwrap().insert(path.to_string());
    }
}

/// In-memory store wrapper that injects failures and counts calls
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryContentStore,
    pub faults: Arc<Faults>,
    pub counters: Arc<Counters>,
}

impl FaultyStore {
    pub fn with_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        Self {
            inner: InMemoryContentStore::with_items(items),
            ..Default::default()
        }
    }
}

fn injected(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("injected {} failure", what))
}

#[async_trait]
impl ContentStore for FaultyStore {
    async fn connect(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Box<dyn StoreSession>, ConnectionError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::StoreUnavailable("injected".to_string()));
        }
        let inner = self.inner.connect(identity).await?;
        Ok(Box::new(FaultySession {
            inner,
            faults: Arc::clone(&self.faults),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FaultySession {
    inner: Box<dyn StoreSession>,
    faults: Arc<Faults>,
    counters: Arc<Counters>,
}

#[async_trait]
impl StoreSession for FaultySession {
    async fn begin(&mut self) -> Result<(), ConnectionError> {
        if self.faults.fail_begin.load(Ordering::SeqCst) {
            return Err(ConnectionError::SessionUnavailable("injected".to_string()));
        }
        self.inner.begin().await
    }

    async fn query(&mut self, query: &ContentQuery) -> Result<Vec<ContentItem>, QueryError> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_query.load(Ordering::SeqCst) {
            return Err(QueryError::IoError(injected("query")));
        }
        self.inner.query(query).await
    }

    async fn get_item(&mut self, path: &str) -> Result<Option<ContentItem>, QueryError> {
        if self.faults.fail_query.load(Ordering::SeqCst) {
            return Err(QueryError::IoError(injected("query")));
        }
        self.inner.get_item(path).await
    }

    async fn list_children(&mut self, path: &str) -> Result<Vec<ContentItem>, QueryError> {
        if self.faults.fail_query.load(Ordering::SeqCst) {
            return Err(QueryError::IoError(injected("query")));
        }
        self.inner.list_children(path).await
    }

    async fn set_property(
        &mut self,
        path: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), MutationError> {
        self.counters.set_property_calls.fetch_add(1, Ordering::SeqCst);
        let rejected = self.faults.fail_mutation.lock().unwrap().contains(path);
        if rejected {
            return Err(MutationError::ReadOnly(path.to_string()));
        }
        self.inner.set_property(path, name, value).await
    }

    async fn commit(&mut self) -> Result<(), CommitError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            // drop what was staged, as a real failed commit would
            self.inner.release().await;
            return Err(CommitError::IoError(injected("commit")));
        }
        self.inner.commit().await
    }

    async fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release().await;
    }
}
