//! Command emulator: the cache-facing surface over the record store.
//!
//! [`CacheClient`] exposes one operation per emulated command. Every
//! operation is individually transactional, and every public command is an
//! error boundary: storage faults are logged and degraded to a safe default
//! (absent, zero, no-op) instead of reaching the caller. A broken cache
//! reads as an always-missing cache, it does not fail requests.

pub mod sweeper;
pub mod zset;

pub use self::sweeper::Sweeper;

use crate::core::config::Config;
use crate::core::error::TrellisResult;
use crate::core::time::{Clock, Millis, SystemClock};
use crate::lock::LeaseLock;
use crate::store::RecordStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use self::zset::ScoreMap;

/// Client for the emulated command surface.
pub struct CacheClient {
    store: RecordStore,
    clock: Arc<dyn Clock>,
    config: Config,
    sweeper: Mutex<Sweeper>,
}

impl CacheClient {
    /// Open the record store named by `config` and build a client on it.
    pub async fn connect(config: Config) -> TrellisResult<Self> {
        let store = RecordStore::from_config(&config.storage).await?;
        Ok(Self::new(store, config))
    }

    /// Build a client over an existing store, on the system clock.
    pub fn new(store: RecordStore, config: Config) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Build a client with an explicit clock (tests drive expiry manually).
    pub fn with_clock(store: RecordStore, config: Config, clock: Arc<dyn Clock>) -> Self {
        let sweeper = Mutex::new(Sweeper::new(config.sweeper.clone()));
        Self {
            store,
            clock,
            config,
            sweeper,
        }
    }

    /// The underlying record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The clock backing this client and its locks.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Get the value for `key`, or None when absent or expired.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, error = %error, "get failed");
                None
            }
        }
    }

    /// Set `key` to `value`, optionally expiring after `ttl`.
    ///
    /// A single upsert statement, so concurrent sets on the same key never
    /// trip the uniqueness constraint; the last commit wins.
    pub async fn set(&self, key: &str, value: impl AsRef<[u8]>, ttl: Option<Duration>) {
        if let Err(error) = self.try_set(key, value.as_ref(), ttl).await {
            tracing::warn!(key, error = %error, "set failed");
        }
    }

    /// Set `key` with a mandatory TTL.
    pub async fn setex(&self, key: &str, value: impl AsRef<[u8]>, ttl: Duration) {
        if let Err(error) = self.try_set(key, value.as_ref(), Some(ttl)).await {
            tracing::warn!(key, error = %error, "setex failed");
        }
    }

    /// Insert `key` only if no row exists; silently a no-op otherwise.
    ///
    /// Callers that need the outcome must re-`get`. Known looseness: the
    /// existence check is the insert conflict itself, not visibility, so an
    /// expired-but-not-yet-swept row still blocks the insert until the
    /// sweeper removes it.
    pub async fn setnx(&self, key: &str, value: impl AsRef<[u8]>) {
        let now = self.clock.now();
        if let Err(error) = self
            .store
            .insert_if_absent(key, value.as_ref(), None, now)
            .await
        {
            tracing::warn!(key, error = %error, "setnx failed");
        }
    }

    /// Add `amount` to the decimal counter at `key`, returning the sum.
    ///
    /// Read-modify-write inside one transaction; an absent or unparsable
    /// stored value counts as zero. Returns 0 when storage fails.
    pub async fn incr(&self, key: &str, amount: i64) -> i64 {
        match self.try_incr(key, amount).await {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(key, error = %error, "incr failed");
                0
            }
        }
    }

    /// Reset the expiry of `key` to `ttl` from now.
    ///
    /// Affecting zero rows (missing key) is a no-op, not an error.
    pub async fn expire(&self, key: &str, ttl: Duration) {
        let expires_at = self.clock.now().add(ttl);
        if let Err(error) = self.store.set_expiry(key, expires_at).await {
            tracing::warn!(key, error = %error, "expire failed");
        }
    }

    /// Delete every listed key, expired or not; missing keys are fine.
    pub async fn delete(&self, keys: &[&str]) {
        if let Err(error) = self.store.delete_keys(keys).await {
            tracing::warn!(?keys, error = %error, "delete failed");
        }
    }

    /// Merge member scores into the sorted set at `key`.
    ///
    /// New members are added, existing members' scores overwritten, and the
    /// entry is created when absent. A corrupt stored payload is replaced
    /// with the merged members.
    pub async fn zadd<I>(&self, key: &str, mapping: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        if let Err(error) = self.try_zadd(key, mapping).await {
            tracing::warn!(key, error = %error, "zadd failed");
        }
    }

    /// Remove members of the sorted set at `key` with score in
    /// `[min, max]` inclusive, returning how many went.
    ///
    /// `f64::NEG_INFINITY` / `f64::INFINITY` are valid bounds. An absent or
    /// corrupt set removes nothing and returns 0.
    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> u64 {
        match self.try_zremrangebyscore(key, min, max).await {
            Ok(removed) => removed,
            Err(error) => {
                tracing::warn!(key, error = %error, "zremrangebyscore failed");
                0
            }
        }
    }

    /// Count the members of the sorted set at `key`; absent/corrupt is 0.
    pub async fn zcard(&self, key: &str) -> u64 {
        match self.try_zcard(key).await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(key, error = %error, "zcard failed");
                0
            }
        }
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Build a lease lock with the configured default TTL.
    pub fn lock(&self, name: &str) -> LeaseLock {
        self.lock_with_ttl(name, Duration::from_millis(self.config.lock.default_ttl_ms))
    }

    /// Build a lease lock with an explicit TTL.
    pub fn lock_with_ttl(&self, name: &str, ttl: Duration) -> LeaseLock {
        LeaseLock::new(
            self.store.clone(),
            Arc::clone(&self.clock),
            self.config.lock.clone(),
            name,
            ttl,
        )
    }

    // ------------------------------------------------------------------
    // Sweeper lifecycle
    // ------------------------------------------------------------------

    /// Start the background sweeper; a second start while one runs is a no-op.
    pub fn start_sweeper(&self) {
        self.sweeper
            .lock()
            .start(self.store.clone(), Arc::clone(&self.clock));
    }

    /// Stop the background sweeper.
    ///
    /// With `wait`, blocks until the task observes the signal and exits,
    /// bounded by the configured join timeout.
    pub async fn stop_sweeper(&self, wait: bool) {
        let (handle, join_timeout) = {
            let mut sweeper = self.sweeper.lock();
            (sweeper.signal_stop(), sweeper.stop_join_timeout())
        };

        let Some(handle) = handle else { return };
        if !wait {
            return;
        }

        match tokio::time::timeout(join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(error = %error, "sweeper task panicked"),
            Err(_) => tracing::warn!("sweeper stop timed out"),
        }
    }

    /// Check if the background sweep task is alive.
    pub fn sweeper_is_running(&self) -> bool {
        self.sweeper.lock().is_running()
    }

    /// Run one sweep pass now, returning the number of rows removed.
    pub async fn run_sweep_once(&self) -> u64 {
        sweeper::sweep_once(&self.store, self.clock.as_ref()).await
    }

    // ------------------------------------------------------------------
    // Fallible internals
    // ------------------------------------------------------------------

    async fn try_get(&self, key: &str) -> TrellisResult<Option<Vec<u8>>> {
        let entry = self.store.fetch_visible(key, self.clock.now()).await?;
        Ok(entry.map(|e| e.value))
    }

    async fn try_set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> TrellisResult<()> {
        let now = self.clock.now();
        let expires_at = ttl.map(|d| now.add(d));
        self.store.upsert(key, value, expires_at, now).await
    }

    async fn try_incr(&self, key: &str, amount: i64) -> TrellisResult<i64> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let row = RecordStore::fetch_any_in(&mut *tx, key).await?;
        let (current, expires_at) = match &row {
            Some(entry) => (parse_counter(&entry.value), entry.expires_at.map(Millis::new)),
            None => (0, None),
        };

        let next = current.saturating_add(amount);
        RecordStore::upsert_in(&mut *tx, key, next.to_string().as_bytes(), expires_at, now).await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn try_zadd<I>(&self, key: &str, mapping: I) -> TrellisResult<()>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let row = RecordStore::fetch_any_in(&mut *tx, key).await?;
        let (mut members, expires_at) = match &row {
            Some(entry) => (
                ScoreMap::decode_or_default(&entry.value),
                entry.expires_at.map(Millis::new),
            ),
            None => (ScoreMap::default(), None),
        };

        members.merge(mapping);
        let encoded = members.encode()?;
        RecordStore::upsert_in(&mut *tx, key, &encoded, expires_at, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn try_zremrangebyscore(&self, key: &str, min: f64, max: f64) -> TrellisResult<u64> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let Some(row) = RecordStore::fetch_any_in(&mut *tx, key).await? else {
            return Ok(0);
        };
        // Corrupt payloads are left in place here; only zadd overwrites them.
        let Some(mut members) = ScoreMap::decode(&row.value) else {
            return Ok(0);
        };

        let removed = members.remove_range(min, max);
        let encoded = members.encode()?;
        RecordStore::upsert_in(
            &mut *tx,
            key,
            &encoded,
            row.expires_at.map(Millis::new),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn try_zcard(&self, key: &str) -> TrellisResult<u64> {
        let row = self.store.fetch_any(key).await?;
        Ok(row
            .and_then(|entry| ScoreMap::decode(&entry.value))
            .map(|members| members.len())
            .unwrap_or(0))
    }
}

/// Parse a stored counter payload; unparsable or non-UTF-8 counts as zero.
fn parse_counter(value: &[u8]) -> i64 {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}
