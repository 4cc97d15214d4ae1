//! CLI command implementations.

mod config;
mod demo;
mod sweep;

pub use config::{run_config, ConfigArgs};
pub use demo::{run_demo, DemoArgs};
pub use sweep::{run_sweep, SweepArgs};

use crate::core::config::Config;
use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration for a command.
///
/// An explicit `--config` path must exist; without one, `trellis.toml` is
/// used when present and built-in defaults otherwise.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    match explicit {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path)),
        None => {
            let default_path = Path::new("trellis.toml");
            if default_path.exists() {
                Config::from_file(default_path).context("failed to load trellis.toml")
            } else {
                Ok(Config::default())
            }
        }
    }
}
