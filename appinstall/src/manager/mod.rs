//! Install lifecycle management.
//!
//! This module contains the state machine that drives an application from an
//! install request to `ready`, together with the records it persists and the
//! sub-components it coordinates.
//!
//! # Components
//!
//! - [`InstallStateMachine`]: command surface and event pump
//! - [`InstallRecord`]: persisted per-application state
//! - [`next_state`]: the pure transition table
//! - [`download`]: resumable archive transfers
//! - [`IconSlot`] / [`IconFetcher`]: the independent icon sub-state
//! - [`RecordStore`]: injected persistence
//!
//! # Example
//!
//! ```ignore
//! use appinstall::events::{NotificationBus, Topic};
//! use appinstall::manager::{InstallStateMachine, ManagerConfig};
//!
//! let bus = NotificationBus::new();
//! bus.subscribe(Topic::All, |event| println!("{}: {}", event.name(), event.id()));
//!
//! let machine = InstallStateMachine::open_default(ManagerConfig::default(), bus)?;
//! let record = machine.install_package("https://example.com/app/package.manifest").await?;
//! machine.pause(record.id()).await?;
//! machine.resume(record.id()).await?;
//! ```

mod config;
pub mod download;
mod error;
mod icon;
mod lifecycle;
mod record;
mod store;
mod transition;
mod writer;

pub use config::{
    default_data_dir, ManagerConfig, DEFAULT_CHECKPOINT_INTERVAL_MS, DEFAULT_STALL_TIMEOUT_SECS,
};
pub use error::{Command, ManagerError, ManagerResult};
pub use icon::{CachedIcon, IconFetchError, IconFetcher, IconSlot, DEFAULT_MAX_ICON_BYTES};
pub use lifecycle::InstallStateMachine;
pub use record::{Affordance, AppId, FailureKind, InstallRecord, InstallState};
pub use store::{JsonRecordStore, MemoryRecordStore, RecordStore, StoreError};
pub use transition::{next_state, RejectedTrigger, Transition, Trigger};
