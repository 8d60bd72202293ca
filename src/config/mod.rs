use crate::utils::{
    ContentPath, PathError, DEFAULT_CONTENT_PATH, DEFAULT_DEBOUNCE_WINDOW_SECS,
    DEFAULT_INTERVAL_SECS, DEFAULT_SERVICE_USER,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid content path: {0}")]
    InvalidContentPath(#[from] PathError),

    #[error("Interval must be at least one second")]
    ZeroInterval,

    #[error("Service user cannot be empty")]
    EmptyServiceUser,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_content_path() -> String {
    DEFAULT_CONTENT_PATH.to_string()
}

fn default_debounce_window_secs() -> u64 {
    DEFAULT_DEBOUNCE_WINDOW_SECS
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./repository")
}

fn default_service_user() -> String {
    DEFAULT_SERVICE_USER.to_string()
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// When false the trigger keeps ticking but never starts a run
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between scheduled runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Root under which published items are searched
    #[serde(default = "default_content_path")]
    pub content_path: String,
    /// Minimum seconds between two stamps of the same item
    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: u64,
    /// Directory of the filesystem content store
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    /// Identity the store sessions are opened for
    #[serde(default = "default_service_user")]
    pub service_user: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            content_path: default_content_path(),
            debounce_window_secs: default_debounce_window_secs(),
            store_root: default_store_root(),
            service_user: default_service_user(),
        }
    }
}

/// Values given on the command line or through the environment.
/// `None` keeps whatever the file (or the default) says.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub content_path: Option<String>,
    pub debounce_window_secs: Option<u64>,
    pub store_root: Option<PathBuf>,
    pub service_user: Option<String>,
}

impl DaemonConfig {
    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(enabled) = overrides.enabled {
            self.enabled = enabled;
        }
        if let Some(secs) = overrides.interval_secs {
            self.interval_secs = secs;
        }
        if let Some(path) = overrides.content_path {
            self.content_path = path;
        }
        if let Some(secs) = overrides.debounce_window_secs {
            self.debounce_window_secs = secs;
        }
        if let Some(root) = overrides.store_root {
            self.store_root = root;
        }
        if let Some(user) = overrides.service_user {
            self.service_user = user;
        }
        self
    }

    /// Check the values that cannot be expressed by types alone
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.service_user.trim().is_empty() {
            return Err(ConfigError::EmptyServiceUser);
        }
        self.search_root()?;
        Ok(())
    }

    pub fn search_root(&self) -> Result<ContentPath, ConfigError> {
        Ok(ContentPath::parse(&self.content_path)?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_window_secs)
    }
}

/// Read the configuration file, `None` if it does not exist
pub async fn read_config(config_path: &Path) -> Result<Option<DaemonConfig>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path).await?;
    let config: DaemonConfig = serde_json::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file atomically (temp file + rename)
pub async fn write_config(config_path: &Path, config: &DaemonConfig) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = config_path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&temp_path, &content).await?;
    fs::rename(&temp_path, config_path).await?;
    Ok(())
}

/// Load the file at `config_path` (if any), apply overrides and validate
pub async fn load_config(
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<DaemonConfig, ConfigError> {
    let base = match config_path {
        Some(path) => read_config(path).await?.unwrap_or_default(),
        None => DaemonConfig::default(),
    };
    let config = base.apply(overrides);
    config.validate()?;
    Ok(config)
}
