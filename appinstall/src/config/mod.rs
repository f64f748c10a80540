//! User configuration file.
//!
//! Settings live in an INI file at `~/.appinstall/config.ini`:
//!
//! ```ini
//! [install]
//! data_dir = /home/user/.appinstall
//! connect_timeout_secs = 30
//! stall_timeout_secs = 60
//! checkpoint_interval_ms = 500
//!
//! [logging]
//! level = info
//! file = /home/user/.appinstall/logs/appinstall.log
//! ```
//!
//! Missing files and missing keys fall back to defaults. Individual settings
//! are addressed as `section.key` through [`ConfigKey`].

mod file;
mod keys;

use std::path::PathBuf;

pub use file::{ConfigError, ConfigFile, InstallSettings, LoggingSettings, DEFAULT_LOG_LEVEL};
pub use keys::ConfigKey;

use crate::manager::default_data_dir;

/// Directory holding the config file.
pub fn config_dir() -> PathBuf {
    default_data_dir()
}

/// Path of the config file.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}
