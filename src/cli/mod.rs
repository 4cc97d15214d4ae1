//! Command-line interface.
//!
//! The `trellis` binary is a demonstration and maintenance harness around
//! the library: it exercises the command surface end to end, runs one-shot
//! sweeps, and validates configuration files.

pub mod commands;

use clap::{Parser, Subcommand};

/// Trellis - cache and lease-lock emulation over a relational table.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Exercise the command surface against a throwaway store.
    Demo(commands::DemoArgs),
    /// Run a single expiry sweep and report removed rows.
    Sweep(commands::SweepArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
