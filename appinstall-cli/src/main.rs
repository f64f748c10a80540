//! AppInstall CLI.
//!
//! Installs launcher applications from their manifests, follows package
//! downloads and manages the resulting records.

mod commands;
mod error;
mod runner;

use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::cancel::CancelArgs;
use commands::config::ConfigCommands;
use commands::install::InstallArgs;
use commands::resume::ResumeArgs;
use commands::uninstall::UninstallArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "appinstall", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install an app from its manifest URL
    Install(InstallArgs),

    /// Resume a paused or failed install
    Resume(ResumeArgs),

    /// Abandon an install that has not finished
    Cancel(CancelArgs),

    /// Remove an app and its downloaded files
    Uninstall(UninstallArgs),

    /// Show every known app and its install state
    List,

    /// View or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Install(args) => commands::install::run(args),
        Commands::Resume(args) => commands::resume::run(args),
        Commands::Cancel(args) => commands::cancel::run(args),
        Commands::Uninstall(args) => commands::uninstall::run(args),
        Commands::List => commands::list::run(),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(1);
    }
}
