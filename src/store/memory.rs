use super::query::ContentQuery;
use super::types::{ContentItem, PropertyValue, ServiceIdentity};
use super::{
    overlay_pending, CommitError, ConnectionError, ContentStore, MutationError, PendingWrites,
    QueryError, StoreSession,
};
use crate::utils::ContentPath;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type ItemMap = BTreeMap<String, ContentItem>;

/// Content tree held in memory, shared by every session it hands out
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    items: Arc<Mutex<ItemMap>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `items`
    pub fn with_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        let map = items
            .into_iter()
            .map(|item| (item.path.clone(), item))
            .collect();
        Self {
            items: Arc::new(Mutex::new(map)),
        }
    }

    /// Insert or replace an item directly, bypassing sessions
    pub async fn insert(&self, item: ContentItem) {
        self.items.lock().await.insert(item.path.clone(), item);
    }

    /// Committed state of a single item
    pub async fn get(&self, path: &str) -> Option<ContentItem> {
        self.items.lock().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn connect(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Box<dyn StoreSession>, ConnectionError> {
        if identity.service_user.trim().is_empty() {
            return Err(ConnectionError::Unauthorized(identity.service_user.clone()));
        }
        Ok(Box::new(InMemorySession {
            items: Arc::clone(&self.items),
            pending: PendingWrites::new(),
            state: SessionState::Connected,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connected,
    Active,
    Released,
}

struct InMemorySession {
    items: Arc<Mutex<ItemMap>>,
    pending: PendingWrites,
    state: SessionState,
}

impl InMemorySession {
    fn ensure_active(&self) -> Result<(), QueryError> {
        match self.state {
            SessionState::Active => Ok(()),
            _ => Err(QueryError::SessionClosed),
        }
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn begin(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            SessionState::Released => Err(ConnectionError::SessionUnavailable(
                "session already released".to_string(),
            )),
            _ => {
                self.state = SessionState::Active;
                Ok(())
            }
        }
    }

    async fn query(&mut self, query: &ContentQuery) -> Result<Vec<ContentItem>, QueryError> {
        self.ensure_active()?;
        let items = self.items.lock().await;
        Ok(items
            .values()
            .cloned()
            .map(|item| overlay_pending(item, &self.pending))
            .filter(|item| query.matches(item))
            .collect())
    }

    async fn get_item(&mut self, path: &str) -> Result<Option<ContentItem>, QueryError> {
        self.ensure_active()?;
        let items = self.items.lock().await;
        Ok(items
            .get(path)
            .cloned()
            .map(|item| overlay_pending(item, &self.pending)))
    }

    async fn list_children(&mut self, path: &str) -> Result<Vec<ContentItem>, QueryError> {
        self.ensure_active()?;
        let parent = match ContentPath::parse(path) {
            Ok(p) => p,
            Err(_) => return Ok(Vec::new()),
        };
        let items = self.items.lock().await;
        Ok(items
            .values()
            .filter(|item| {
                ContentPath::parse(&item.path)
                    .map(|p| p.is_child_of(&parent))
                    .unwrap_or(false)
            })
            .cloned()
            .map(|item| overlay_pending(item, &self.pending))
            .collect())
    }

    async fn set_property(
        &mut self,
        path: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), MutationError> {
        if self.state != SessionState::Active {
            return Err(MutationError::SessionClosed);
        }
        if !self.items.lock().await.contains_key(path) {
            return Err(MutationError::ItemNotFound(path.to_string()));
        }
        self.pending
            .entry(path.to_string())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), CommitError> {
        let pending = std::mem::take(&mut self.pending);
        if self.state != SessionState::Active {
            return Err(CommitError::SessionClosed);
        }

        let mut items = self.items.lock().await;
        if let Some(missing) = pending.keys().find(|path| !items.contains_key(*path)) {
            return Err(CommitError::ItemVanished(missing.clone()));
        }
        for (path, props) in pending {
            if let Some(item) = items.get_mut(&path) {
                item.properties.extend(props);
            }
        }
        Ok(())
    }

    async fn release(&mut self) {
        self.pending.clear();
        self.state = SessionState::Released;
    }
}
