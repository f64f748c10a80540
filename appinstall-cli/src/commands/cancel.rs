//! `appinstall cancel`.

use appinstall::manager::AppId;
use clap::Args;
use console::style;

use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Manifest URL the app was installed from
    pub id: String,
}

/// Abandon an install that has not reached `ready`.
pub fn run(args: CancelArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("cancel");

    let machine = runner.open_machine()?;
    let id = AppId::new(args.id);
    runner.block_on(machine.cancel(&id))?;

    println!("{} {}", style("cancelled").yellow(), id);
    Ok(())
}
