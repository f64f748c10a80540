//! Addressing individual settings as `section.key`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    InstallDataDir,
    InstallConnectTimeoutSecs,
    InstallStallTimeoutSecs,
    InstallCheckpointIntervalMs,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::InstallDataDir,
            ConfigKey::InstallConnectTimeoutSecs,
            ConfigKey::InstallStallTimeoutSecs,
            ConfigKey::InstallCheckpointIntervalMs,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingFile,
        ]
    }

    /// Section the key lives in.
    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::InstallDataDir
            | ConfigKey::InstallConnectTimeoutSecs
            | ConfigKey::InstallStallTimeoutSecs
            | ConfigKey::InstallCheckpointIntervalMs => "install",
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
        }
    }

    /// Key name within its section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::InstallDataDir => "data_dir",
            ConfigKey::InstallConnectTimeoutSecs => "connect_timeout_secs",
            ConfigKey::InstallStallTimeoutSecs => "stall_timeout_secs",
            ConfigKey::InstallCheckpointIntervalMs => "checkpoint_interval_ms",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value, formatted as it appears in the file.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::InstallDataDir => config.install.data_dir.display().to_string(),
            ConfigKey::InstallConnectTimeoutSecs => config.install.connect_timeout_secs.to_string(),
            ConfigKey::InstallStallTimeoutSecs => config.install.stall_timeout_secs.to_string(),
            ConfigKey::InstallCheckpointIntervalMs => {
                config.install.checkpoint_interval_ms.to_string()
            }
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config.logging.file.display().to_string(),
        }
    }

    /// Validate and store a value.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::InstallDataDir => config.install.data_dir = self.parse_path(value)?,
            ConfigKey::InstallConnectTimeoutSecs => {
                config.install.connect_timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::InstallStallTimeoutSecs => {
                config.install.stall_timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::InstallCheckpointIntervalMs => {
                config.install.checkpoint_interval_ms = self.parse_number(value)?
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, format!("expected one of {}", LOG_LEVELS.join(", "))));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingFile => config.logging.file = self.parse_path(value)?,
        }
        Ok(())
    }

    fn parse_number(&self, value: &str) -> Result<u64, ConfigError> {
        value
            .parse()
            .map_err(|_| self.invalid(value, "expected a whole number".to_string()))
    }

    fn parse_positive(&self, value: &str) -> Result<u64, ConfigError> {
        match self.parse_number(value)? {
            0 => Err(self.invalid(value, "must be greater than zero".to_string())),
            n => Ok(n),
        }
    }

    fn parse_path(&self, value: &str) -> Result<PathBuf, ConfigError> {
        if value.is_empty() {
            return Err(self.invalid(value, "path cannot be empty".to_string()));
        }
        Ok(expand_home(value))
    }

    fn invalid(&self, value: &str, reason: String) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_names() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!(matches!(
            "install.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ConfigFile::default();

        ConfigKey::InstallStallTimeoutSecs.set(&mut config, "45").unwrap();
        ConfigKey::LoggingLevel.set(&mut config, "DEBUG").unwrap();

        assert_eq!(ConfigKey::InstallStallTimeoutSecs.get(&config), "45");
        assert_eq!(ConfigKey::LoggingLevel.get(&config), "debug");
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = ConfigFile::default();

        assert!(ConfigKey::InstallConnectTimeoutSecs.set(&mut config, "0").is_err());
        assert!(ConfigKey::InstallCheckpointIntervalMs.set(&mut config, "-1").is_err());
        assert!(ConfigKey::LoggingLevel.set(&mut config, "loud").is_err());
        assert!(ConfigKey::InstallDataDir.set(&mut config, "  ").is_err());
    }

    #[test]
    fn test_checkpoint_interval_may_be_zero() {
        let mut config = ConfigFile::default();
        ConfigKey::InstallCheckpointIntervalMs.set(&mut config, "0").unwrap();
        assert_eq!(config.install.checkpoint_interval_ms, 0);
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/apps"), home.join("apps"));
        }
        assert_eq!(expand_home("/srv/apps"), PathBuf::from("/srv/apps"));
    }
}
