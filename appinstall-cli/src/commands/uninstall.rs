//! `appinstall uninstall`.

use appinstall::manager::{AppId, ManagerError};
use clap::Args;
use console::style;
use dialoguer::Confirm;

use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// Manifest URL the app was installed from
    pub id: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub fn run(args: UninstallArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("uninstall");

    let machine = runner.open_machine()?;
    let id = AppId::new(args.id);
    let record = machine
        .record(&id)
        .ok_or_else(|| ManagerError::NotFound { id: id.clone() })?;

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove {} ({})?", record.name(), record.state()))
            .default(false)
            .interact()
            .map_err(|e| CliError::Prompt(e.to_string()))?;
        if !confirmed {
            println!("Nothing removed.");
            return Ok(());
        }
    }

    runner.block_on(machine.uninstall(&id))?;
    println!("{} {}", style("removed").green(), record.name());
    Ok(())
}
