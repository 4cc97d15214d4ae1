//! Configuration parsing and validation.
//!
//! Trellis configuration is loaded from TOML files with serde-supplied
//! defaults, so an empty file (or no file at all) yields a working setup
//! against `trellis.db` in the working directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Record store configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Expiry sweeper configuration.
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Lease lock configuration.
    #[serde(default)]
    pub lock: LockConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            sweeper: SweeperConfig::default(),
            lock: LockConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Record store (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path; `":memory:"` selects a private in-memory store.
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// How long a statement waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Connection pool size.
    ///
    /// SQLite permits only limited write concurrency; one connection
    /// serializes in-process writers and avoids persistent "database is
    /// locked" failures.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

/// Expiry sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Sleep before the first sweep after start.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Sleep between sweeps.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound on waiting for the task to observe a stop request.
    #[serde(default = "default_stop_join_timeout_ms")]
    pub stop_join_timeout_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            interval_ms: default_interval_ms(),
            stop_join_timeout_ms: default_stop_join_timeout_ms(),
        }
    }
}

/// Lease lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Prefix reserving lock rows in the shared table.
    #[serde(default = "default_lock_key_prefix")]
    pub key_prefix: String,

    /// Lease TTL applied when a lock is built without an explicit one.
    #[serde(default = "default_lock_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Probability that an acquire first sweeps abandoned lock rows.
    #[serde(default = "default_cleanup_probability")]
    pub cleanup_probability: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_lock_key_prefix(),
            default_ttl_ms: default_lock_ttl_ms(),
            cleanup_probability: default_cleanup_probability(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_storage_path() -> String {
    "trellis.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_connections() -> u32 {
    1
}

fn default_grace_period_ms() -> u64 {
    60_000
}

fn default_interval_ms() -> u64 {
    300_000
}

fn default_stop_join_timeout_ms() -> u64 {
    5_000
}

fn default_lock_key_prefix() -> String {
    "lock_".to_string()
}

fn default_lock_ttl_ms() -> u64 {
    60_000
}

fn default_cleanup_probability() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.is_empty() {
            anyhow::bail!("storage.path must not be empty");
        }
        if self.storage.max_connections == 0 {
            anyhow::bail!("storage.max_connections must be > 0");
        }
        if self.sweeper.interval_ms == 0 {
            anyhow::bail!("sweeper.interval_ms must be > 0");
        }
        if self.lock.key_prefix.is_empty() {
            anyhow::bail!("lock.key_prefix must not be empty");
        }
        if !(0.0..=1.0).contains(&self.lock.cleanup_probability) {
            anyhow::bail!(
                "lock.cleanup_probability must be within [0.0, 1.0], got {}",
                self.lock.cleanup_probability
            );
        }
        if self.lock.default_ttl_ms == 0 {
            anyhow::bail!("lock.default_ttl_ms must be > 0");
        }
        match self.telemetry.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("telemetry.log_level '{}' is not a valid level", other),
        }
        Ok(())
    }
}
