use super::query::ContentQuery;
use super::types::{ContentItem, PropertyValue, ServiceIdentity};
use super::{
    overlay_pending, CommitError, ConnectionError, ContentStore, MutationError, PendingWrites,
    QueryError, StoreSession,
};
use crate::utils::{ContentPath, ITEM_FILE};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

type PropertyMap = BTreeMap<String, PropertyValue>;

/// Content tree stored as directories on disk.
///
/// Item `/a/b` is the directory `<root>/a/b`; its properties live in
/// `<root>/a/b/.content.json`. Directories without that file are plain
/// folders, not items.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn connect(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Box<dyn StoreSession>, ConnectionError> {
        if identity.service_user.trim().is_empty() {
            return Err(ConnectionError::Unauthorized(identity.service_user.clone()));
        }
        if !self.root.is_dir() {
            return Err(ConnectionError::StoreUnavailable(
                self.root.display().to_string(),
            ));
        }

        debug!(root = %self.root.display(), user = %identity.service_user, "Opened store connection");

        Ok(Box::new(FsSession {
            root: self.root.clone(),
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

struct FsSession {
    root: PathBuf,
    pending: PendingWrites,
    state: SessionState,
}

impl FsSession {
    fn ensure_active(&self) -> Result<(), QueryError> {
        match self.state {
            SessionState::Active => Ok(()),
            _ => Err(QueryError::SessionClosed),
        }
    }

    fn item_file(&self, path: &ContentPath) -> PathBuf {
        path.to_fs_path(&self.root).join(ITEM_FILE)
    }

    /// Content path of the item whose directory is `dir`
    fn content_path_of(&self, dir: &Path) -> Option<ContentPath> {
        let relative = dir.strip_prefix(&self.root).ok()?;
        let joined: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        ContentPath::parse(&format!("/{}", joined.join("/"))).ok()
    }

    async fn read_item(&self, path: &ContentPath) -> Result<Option<ContentItem>, QueryError> {
        let file = self.item_file(path);
        if !file.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&file).await?;
        let properties: PropertyMap = serde_json::from_str(&content)?;
        let item = ContentItem {
            path: path.to_string(),
            properties,
        };
        Ok(Some(overlay_pending(item, &self.pending)))
    }
}

#[async_trait]
impl StoreSession for FsSession {
    async fn begin(&mut self) -> Result<(), ConnectionError> {
        if self.state == SessionState::Released {
            return Err(ConnectionError::SessionUnavailable(
                "session already released".to_string(),
            ));
        }
        if !self.root.is_dir() {
            return Err(ConnectionError::SessionUnavailable(format!(
                "store root {} is gone",
                self.root.display()
            )));
        }
        self.state = SessionState::Active;
        Ok(())
    }

    async fn query(&mut self, query: &ContentQuery) -> Result<Vec<ContentItem>, QueryError> {
        self.ensure_active()?;

        let base = query.root.to_fs_path(&self.root);
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();

        for entry in WalkDir::new(&base).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != ITEM_FILE {
                continue;
            }

            let dir = match entry.path().parent() {
                Some(dir) if dir != base.as_path() => dir,
                _ => continue,
            };

            let path = match self.content_path_of(dir) {
                Some(path) => path,
                None => {
                    debug!(dir = %dir.display(), "Skipping item with unsupported name");
                    continue;
                }
            };

            match self.read_item(&path).await {
                Ok(Some(item)) if query.matches(&item) => items.push(item),
                Ok(_) => {}
                Err(e) => warn!(path = %path, error = %e, "Skipping unreadable item"),
            }
        }

        Ok(items)
    }

    async fn get_item(&mut self, path: &str) -> Result<Option<ContentItem>, QueryError> {
        self.ensure_active()?;
        match ContentPath::parse(path) {
            Ok(path) => self.read_item(&path).await,
            Err(_) => Ok(None),
        }
    }

    async fn list_children(&mut self, path: &str) -> Result<Vec<ContentItem>, QueryError> {
        self.ensure_active()?;
        let parent = match ContentPath::parse(path) {
            Ok(p) => p,
            Err(_) => return Ok(Vec::new()),
        };

        let dir = parent.to_fs_path(&self.root);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();

        let mut children = Vec::new();
        for name in names {
            let Ok(child) = parent.join(&name) else {
                continue;
            };
            if let Some(item) = self.read_item(&child).await? {
                children.push(item);
            }
        }
        Ok(children)
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
        let content_path =
            ContentPath::parse(path).map_err(|_| MutationError::ItemNotFound(path.to_string()))?;
        let file = self.item_file(&content_path);

        let metadata = match fs::metadata(&file).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MutationError::ItemNotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.permissions().readonly() {
            return Err(MutationError::ReadOnly(path.to_string()));
        }

        self.pending
            .entry(content_path.to_string())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), CommitError> {
        let pending = std::mem::take(&mut self.pending);
        if self.state != SessionState::Active {
            return Err(CommitError::SessionClosed);
        }
        if pending.is_empty() {
            return Ok(());
        }

        // Write every temp file before touching any live file
        let mut staged: Vec<StagedFile> = Vec::with_capacity(pending.len());
        for (path, props) in &pending {
            match write_temp(&self.root, path, props).await {
                Ok(file) => staged.push(file),
                Err(e) => {
                    discard_temps(&staged).await;
                    return Err(e);
                }
            }
        }

        apply_staged(&staged).await?;

        debug!(count = staged.len(), "Committed staged items");
        Ok(())
    }

    async fn release(&mut self) {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "Discarding uncommitted writes");
        }
        self.pending.clear();
        self.state = SessionState::Released;
    }
}

/// Item file rewritten to a temp file, waiting to be renamed into place
struct StagedFile {
    path: String,
    temp: PathBuf,
    target: PathBuf,
    /// File content before the commit, for rollback
    original: String,
}

/// Set the staged properties on the item's file as it is on disk and write
/// the result next to it. Properties that were not staged keep their raw
/// JSON value.
async fn write_temp(
    root: &Path,
    path: &str,
    props: &PropertyMap,
) -> Result<StagedFile, CommitError> {
    let content_path =
        ContentPath::parse(path).map_err(|_| CommitError::ItemVanished(path.to_string()))?;
    let target = content_path.to_fs_path(root).join(ITEM_FILE);
    if !target.exists() {
        return Err(CommitError::ItemVanished(path.to_string()));
    }

    let original = fs::read_to_string(&target).await?;
    let mut current: Map<String, Value> = serde_json::from_str(&original)?;
    for (name, value) in props {
        current.insert(name.clone(), Value::from(value.clone()));
    }

    let temp = target.with_extension("json.tmp");
    fs::write(&temp, serde_json::to_string_pretty(&current)?).await?;
    Ok(StagedFile {
        path: path.to_string(),
        temp,
        target,
        original,
    })
}

/// Rename every temp file into place. When a rename fails, the temps not
/// yet renamed are removed and the items already replaced are restored.
async fn apply_staged(staged: &[StagedFile]) -> Result<(), CommitError> {
    for (index, file) in staged.iter().enumerate() {
        let Err(e) = fs::rename(&file.temp, &file.target).await else {
            continue;
        };
        error!(path = %file.path, error = %e, "Rename failed, rolling back commit");
        discard_temps(&staged[index..]).await;

        let mut unrestored = Vec::new();
        for applied in &staged[..index] {
            if let Err(restore_err) = restore(applied).await {
                error!(path = %applied.path, error = %restore_err, "Failed to restore item");
                discard_temps(std::slice::from_ref(applied)).await;
                unrestored.push(applied.path.clone());
            }
        }

        if unrestored.is_empty() {
            return Err(CommitError::IoError(e));
        }
        return Err(CommitError::PartiallyApplied {
            applied: unrestored,
            source: e,
        });
    }
    Ok(())
}

async fn restore(file: &StagedFile) -> std::io::Result<()> {
    fs::write(&file.temp, &file.original).await?;
    fs::rename(&file.temp, &file.target).await
}

async fn discard_temps(files: &[StagedFile]) {
    for file in files {
        match fs::remove_file(&file.temp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(temp = %file.temp.display(), error = %e, "Failed to remove temp file"),
        }
    }
}
