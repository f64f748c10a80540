//! `appinstall resume`.

use appinstall::manager::AppId;
use clap::Args;

use super::common::{report, Watch};
use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Manifest URL the app was installed from
    pub id: String,
}

pub fn run(args: ResumeArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("resume");

    let machine = runner.open_machine()?;
    let watch = Watch::open(&machine);
    let id = AppId::new(args.id);

    let record = runner.block_on(machine.resume(&id))?;
    let record = watch.follow(&runner, &machine, record)?;
    runner.block_on(machine.flush())?;
    report(&record);
    Ok(())
}
