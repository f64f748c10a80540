//! Subcommand implementations.

pub mod cancel;
pub mod config;
pub mod install;
pub mod list;
pub mod resume;
pub mod uninstall;

mod common;
