//! Common test utilities.
//!
//! Shared helpers for integration tests. Import with `mod common;` in test
//! files.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use trellis::cache::CacheClient;
use trellis::core::config::Config;
use trellis::core::time::{Clock, ManualClock, Millis};
use trellis::store::RecordStore;

/// Fixed starting instant for manual clocks; an arbitrary real epoch so
/// timestamps look like production data.
pub const START_MS: i64 = 1_700_000_000_000;

/// Build a client over a fresh in-memory store, driven by a manual clock.
pub async fn manual_client() -> (CacheClient, Arc<ManualClock>) {
    manual_client_with_config(Config::default()).await
}

/// Same as [`manual_client`] with custom configuration.
pub async fn manual_client_with_config(config: Config) -> (CacheClient, Arc<ManualClock>) {
    let store = RecordStore::open_in_memory()
        .await
        .expect("failed to open in-memory store");
    let clock = Arc::new(ManualClock::new(Millis::new(START_MS)));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let client = CacheClient::with_clock(store, config, dyn_clock);
    (client, clock)
}

/// Configuration with a sweeper fast enough for lifecycle tests.
pub fn fast_sweeper_config() -> Config {
    let mut config = Config::default();
    config.sweeper.grace_period_ms = 10;
    config.sweeper.interval_ms = 20;
    config.sweeper.stop_join_timeout_ms = 1_000;
    config
}

/// Write a TOML config to a temp file.
pub fn write_config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write config");
    file
}

/// Assert that an optional byte value equals the expected string.
#[track_caller]
pub fn assert_value_eq(actual: Option<Vec<u8>>, expected: &str) {
    match actual {
        Some(bytes) => assert_eq!(
            bytes,
            expected.as_bytes(),
            "value mismatch: got {:?}",
            String::from_utf8_lossy(&bytes)
        ),
        None => panic!("expected {:?}, got absent", expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_client_starts_empty() {
        let (client, clock) = manual_client().await;
        assert_eq!(client.store().count().await.unwrap(), 0);
        assert_eq!(clock.now().ms, START_MS);
    }

    #[test]
    fn test_write_config_file() {
        let file = write_config_file("[storage]\npath = \"x.db\"\n");
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.storage.path, "x.db");
    }
}
