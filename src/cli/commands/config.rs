//! Config command: validate and display configuration.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Check that the configuration parses and validates.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

/// Run the config command against an already-loaded configuration.
pub fn run_config(args: ConfigArgs, config: Config) -> Result<()> {
    match args.action {
        ConfigAction::Validate => {
            config.validate()?;
            println!("configuration is valid");
        }
        ConfigAction::Show => {
            let rendered =
                toml::to_string_pretty(&config).context("failed to render configuration")?;
            print!("{}", rendered);
        }
    }
    Ok(())
}
