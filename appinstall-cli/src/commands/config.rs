//! `appinstall config` subcommands.

use appinstall::config::{config_file_path, ConfigFile, ConfigKey};
use clap::Subcommand;

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting as section.key (e.g. install.stall_timeout_secs)
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Setting as section.key (e.g. logging.level)
        key: String,

        /// New value
        value: String,
    },

    /// Print every setting grouped by section
    List,

    /// Print where the config file lives
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::load()?;
            println!("{}", key.get(&config));
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = ConfigFile::load()?;
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{} = {}", key, key.get(&config));
        }
        ConfigCommands::List => print_all(&ConfigFile::load()?),
        ConfigCommands::Path => println!("{}", config_file_path().display()),
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "no setting named '{}' (run 'appinstall config list' for the full set)",
            key
        ))
    })
}

fn print_all(config: &ConfigFile) {
    let mut section = None;
    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            if section.is_some() {
                println!();
            }
            println!("[{}]", key.section());
            section = Some(key.section());
        }
        println!("  {} = {}", key.key_name(), key.get(config));
    }
}
