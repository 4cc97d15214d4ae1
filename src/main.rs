//! Trellis - unified CLI entrypoint.
//!
//! Usage:
//!   trellis demo [--db PATH]
//!   trellis sweep [--db PATH]
//!   trellis config validate
//!   trellis config show

use anyhow::Result;
use clap::Parser;
use trellis::cli::commands::{load_config, run_config, run_demo, run_sweep};
use trellis::cli::{Cli, Commands};

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let level = cli
        .log_level
        .unwrap_or_else(|| config.telemetry.log_level.clone());
    init_tracing(&level);

    match cli.command {
        Commands::Demo(args) => run_demo(args, config).await,
        Commands::Sweep(args) => run_sweep(args, config).await,
        Commands::Config(args) => run_config(args, config),
    }
}
