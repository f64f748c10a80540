//! Configuration for the install manager.

use std::path::PathBuf;
use std::time::Duration;

use super::icon::DEFAULT_MAX_ICON_BYTES;
use crate::config::ConfigFile;
use crate::http::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::manifest::DEFAULT_MAX_MANIFEST_BYTES;

/// Default stall timeout for archive transfers in seconds.
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 60;

/// Default interval between persisted progress checkpoints in milliseconds.
pub const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 500;

/// Configuration for the install manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root directory for install records and package archives.
    pub data_dir: PathBuf,

    /// HTTP connect timeout.
    pub connect_timeout: Duration,

    /// How long a transfer may go without receiving bytes before it fails
    /// as a network error.
    pub stall_timeout: Duration,

    /// Minimum interval between progress writes to the record store.
    pub checkpoint_interval: Duration,

    /// Maximum accepted manifest size.
    pub max_manifest_bytes: usize,

    /// Maximum accepted icon size.
    pub max_icon_bytes: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            stall_timeout: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
            checkpoint_interval: Duration::from_millis(DEFAULT_CHECKPOINT_INTERVAL_MS),
            max_manifest_bytes: DEFAULT_MAX_MANIFEST_BYTES,
            max_icon_bytes: DEFAULT_MAX_ICON_BYTES,
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration with the given data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Build a configuration from the user's config file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        let install = &config.install;
        Self {
            data_dir: install.data_dir.clone(),
            connect_timeout: Duration::from_secs(install.connect_timeout_secs),
            stall_timeout: Duration::from_secs(install.stall_timeout_secs),
            checkpoint_interval: Duration::from_millis(install.checkpoint_interval_ms),
            ..Default::default()
        }
    }

    /// Set the HTTP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the transfer stall timeout.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the progress checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set the maximum manifest size.
    pub fn with_max_manifest_bytes(mut self, max: usize) -> Self {
        self.max_manifest_bytes = max;
        self
    }

    /// Set the maximum icon size.
    pub fn with_max_icon_bytes(mut self, max: usize) -> Self {
        self.max_icon_bytes = max;
        self
    }

    /// Directory holding one JSON document per install record.
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Directory holding partial and completed package archives.
    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }
}

/// Default data directory (`~/.appinstall`), or a temp dir without a home.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".appinstall"))
        .unwrap_or_else(|| std::env::temp_dir().join("appinstall"))
}
