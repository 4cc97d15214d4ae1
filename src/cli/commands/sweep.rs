//! Sweep command: one-shot expiry reclamation.

use crate::cache::CacheClient;
use crate::core::config::Config;
use anyhow::Result;
use clap::Args;

/// Run a single expiry sweep.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Database file to sweep; overrides the configured path.
    #[arg(long)]
    pub db: Option<String>,
}

/// Run the sweep command.
pub async fn run_sweep(args: SweepArgs, mut config: Config) -> Result<()> {
    if let Some(db) = args.db {
        config.storage.path = db;
    }

    let client = CacheClient::connect(config).await?;
    let removed = client.run_sweep_once().await;
    println!("removed {} expired rows", removed);
    Ok(())
}
