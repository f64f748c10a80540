//! Shared setup for commands that talk to the install manager.

use std::future::Future;
use std::sync::Arc;

use appinstall::config::ConfigFile;
use appinstall::events::NotificationBus;
use appinstall::logging::{init_logging, WorkerGuard};
use appinstall::manager::{InstallStateMachine, ManagerConfig};
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Loaded configuration, logging and an async runtime.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _log_guard: WorkerGuard,
}

impl CliRunner {
    /// Load the config file, start logging and build the runtime.
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let log_guard = init_logging(&config.logging.file, &config.logging.level)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log which command is running.
    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = appinstall::VERSION,
            command,
            data_dir = %self.config.install.data_dir.display(),
            "AppInstall CLI starting"
        );
    }

    /// Open the install manager on this runner's runtime.
    pub fn open_machine(&self) -> Result<Arc<InstallStateMachine>, CliError> {
        let _enter = self.runtime.enter();
        let config = ManagerConfig::from_config_file(&self.config);
        Ok(InstallStateMachine::open_default(config, NotificationBus::new())?)
    }

    /// Run a future to completion on the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
