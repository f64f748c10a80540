//! `appinstall install`.

use clap::Args;

use super::common::{report, Watch};
use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Manifest URL (a package manifest when --packaged is given)
    pub url: String,

    /// Install a packaged app by downloading its archive
    #[arg(long)]
    pub packaged: bool,

    /// Return once the install is accepted; an unfinished download is
    /// restored as paused on the next run
    #[arg(long)]
    pub detach: bool,
}

pub fn run(args: InstallArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("install");

    let machine = runner.open_machine()?;
    let watch = Watch::open(&machine);

    let record = runner.block_on(async {
        if args.packaged {
            machine.install_package(&args.url).await
        } else {
            machine.install(&args.url).await
        }
    })?;
    tracing::info!(id = %record.id(), state = %record.state(), "Install accepted");

    let record = if args.detach {
        record
    } else {
        watch.follow(&runner, &machine, record)?
    };
    runner.block_on(machine.flush())?;
    report(&record);
    Ok(())
}
