//! Lease lock: named mutual exclusion over the shared table.
//!
//! A lock is an ordinary entry whose key carries a reserved prefix and
//! whose value is a JSON descriptor of the holder: process identity, thread
//! identity, acquisition timestamp. The row itself never expires; liveness
//! is judged from the embedded timestamp, so a crashed holder's lease ends
//! even though its row survives.
//!
//! Acquisition is a single immediate attempt. Takeover of a stale or
//! corrupt holder goes through a conditional update guarded by the exact
//! bytes just read — never a blind overwrite — so racing takeovers cannot
//! both succeed. Two sources of truth are kept deliberately separate: the
//! in-process `held` flag answers "did *this* handle acquire?", the durable
//! row answers "who holds it across processes?".

use crate::core::config::LockConfig;
use crate::core::error::{TrellisError, TrellisResult};
use crate::core::time::{Clock, Millis};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Identity of a lock holder.
///
/// Captured once when the lock handle is built: tokio tasks migrate across
/// worker threads, so sampling the thread per call would make a holder
/// fail its own release fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    /// Operating-system process id.
    pub process_id: u32,

    /// Thread identity, stable only within the process lifetime.
    pub thread_id: String,
}

impl OwnerIdentity {
    /// Identity of the calling process and thread.
    pub fn current() -> Self {
        Self {
            process_id: std::process::id(),
            thread_id: format!("{:?}", std::thread::current().id()),
        }
    }
}

impl std::fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.process_id, self.thread_id)
    }
}

/// The JSON payload stored in a lock row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDescriptor {
    /// Holder's process id.
    pub process_id: u32,

    /// Holder's thread identity.
    pub thread_id: String,

    /// Acquisition instant in unix milliseconds.
    pub timestamp_ms: i64,
}

impl LockDescriptor {
    /// Build a descriptor for `owner` acquiring now.
    pub fn new(owner: &OwnerIdentity, now: Millis) -> Self {
        Self {
            process_id: owner.process_id,
            thread_id: owner.thread_id.clone(),
            timestamp_ms: now.ms,
        }
    }

    /// Decode a stored payload; None when corrupt.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Encode for storage.
    pub fn encode(&self) -> TrellisResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check if the lease has outlived `ttl` at the given instant.
    pub fn is_stale_at(&self, now: Millis, ttl: Duration) -> bool {
        now.since(Millis::new(self.timestamp_ms)) > ttl.as_millis() as i64
    }

    /// Check if this descriptor belongs to `owner`.
    pub fn is_owned_by(&self, owner: &OwnerIdentity) -> bool {
        self.process_id == owner.process_id && self.thread_id == owner.thread_id
    }
}

/// A named, non-reentrant-across-processes mutual exclusion handle.
pub struct LeaseLock {
    store: RecordStore,
    clock: Arc<dyn Clock>,
    config: LockConfig,
    name: String,
    key: String,
    ttl: Duration,
    owner: OwnerIdentity,
    held: bool,
}

impl LeaseLock {
    /// Build a lock handle. Nothing touches storage until `acquire`.
    pub fn new(
        store: RecordStore,
        clock: Arc<dyn Clock>,
        config: LockConfig,
        name: &str,
        ttl: Duration,
    ) -> Self {
        let key = format!("{}{}", config.key_prefix, name);
        Self {
            store,
            clock,
            config,
            name: name.to_string(),
            key,
            ttl,
            owner: OwnerIdentity::current(),
            held: false,
        }
    }

    /// Replace the owner identity this handle acquires and releases as.
    ///
    /// Lets tests model distinct logical owners inside one process.
    pub fn with_owner(mut self, owner: OwnerIdentity) -> Self {
        self.owner = owner;
        self
    }

    /// The lock's name (without the key prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lease TTL after which a holder is considered stale.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check if this handle currently believes it holds the lock.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Attempt to acquire the lock.
    ///
    /// One immediate attempt; returns false when the lock is validly held
    /// elsewhere or a racing acquirer won, and the caller decides whether
    /// to call again. Blocking acquisition is unsupported.
    ///
    /// # Panics
    ///
    /// Panics if `blocking` is true — a precondition violation, not a
    /// degradable condition.
    pub async fn acquire(&mut self, blocking: bool) -> bool {
        assert!(!blocking, "LeaseLock does not support blocking acquisition");

        if self.held {
            return true;
        }

        // Occasionally reap abandoned lock rows; their prefix never matches
        // a cache TTL, so nothing else would.
        if rand::random::<f64>() < self.config.cleanup_probability {
            if let Err(error) = self.cleanup_abandoned().await {
                tracing::warn!(name = %self.name, error = %error, "lock cleanup failed");
            }
        }

        match self.try_acquire().await {
            Ok(true) => {
                self.held = true;
                tracing::debug!(name = %self.name, owner = %self.owner, "lock acquired");
                true
            }
            Ok(false) => {
                tracing::debug!(name = %self.name, "lock unavailable");
                false
            }
            Err(error) => {
                tracing::warn!(name = %self.name, error = %error, "lock acquisition failed");
                false
            }
        }
    }

    async fn try_acquire(&self) -> TrellisResult<bool> {
        let now = self.clock.now();
        let descriptor = LockDescriptor::new(&self.owner, now).encode()?;

        let Some(row) = self.store.fetch_any(&self.key).await? else {
            // No holder: race to create the row. Zero affected rows means a
            // concurrent creator won.
            return self
                .store
                .insert_if_absent(&self.key, &descriptor, None, now)
                .await;
        };

        match LockDescriptor::decode(&row.value) {
            Some(existing) if !existing.is_stale_at(now, self.ttl) => Ok(false),
            // Stale or corrupt holder: take over only if the stored bytes
            // are still exactly what we read. Losing the swap means another
            // acquirer got there first; no retry here.
            _ => {
                self.store
                    .compare_and_swap(&self.key, &row.value, &descriptor)
                    .await
            }
        }
    }

    /// Release the lock.
    ///
    /// No-op unless this handle holds it. The row is deleted only when its
    /// descriptor still carries our identity; a lock reclaimed by someone
    /// else after expiry is left alone. The in-process flag clears on every
    /// path.
    pub async fn release(&mut self) {
        if !self.held {
            return;
        }

        if let Err(error) = self.try_release().await {
            tracing::warn!(name = %self.name, error = %error, "lock release failed");
        }
        self.held = false;
    }

    async fn try_release(&self) -> TrellisResult<()> {
        let Some(row) = self.store.fetch_any(&self.key).await? else {
            return Ok(());
        };

        match LockDescriptor::decode(&row.value) {
            Some(existing) if existing.is_owned_by(&self.owner) => {
                self.store.delete_keys(&[&self.key]).await?;
                tracing::debug!(name = %self.name, "lock released");
            }
            Some(existing) => {
                tracing::warn!(
                    name = %self.name,
                    holder = %format!("{}/{}", existing.process_id, existing.thread_id),
                    "lock held by another owner, leaving row"
                );
            }
            None => {
                // Corrupt descriptor under our key while we hold the flag:
                // treat it as ours and clean it up.
                tracing::warn!(name = %self.name, "corrupt lock payload, deleting");
                self.store.delete_keys(&[&self.key]).await?;
            }
        }
        Ok(())
    }

    /// Acquire, run `body`, and release on the way out.
    ///
    /// The one place a lock failure becomes a hard error: when acquisition
    /// fails the body never runs and [`TrellisError::LockUnavailable`] is
    /// returned. Release happens on both the success and error-value paths;
    /// a body that panics forfeits the lease until its TTL lapses.
    pub async fn with_lock<F, Fut, T>(&mut self, body: F) -> TrellisResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.acquire(false).await {
            return Err(TrellisError::LockUnavailable {
                name: self.name.clone(),
            });
        }

        let output = body().await;
        self.release().await;
        Ok(output)
    }

    /// Best-effort reap of abandoned lock rows under the reserved prefix.
    ///
    /// A row is abandoned when its descriptor is older than this lock's TTL
    /// window, or unreadable.
    async fn cleanup_abandoned(&self) -> TrellisResult<()> {
        let now = self.clock.now();
        let rows = self.store.fetch_prefixed(&self.config.key_prefix).await?;

        let doomed: Vec<String> = rows
            .into_iter()
            .filter(|row| match LockDescriptor::decode(&row.value) {
                Some(descriptor) => descriptor.is_stale_at(now, self.ttl),
                None => true,
            })
            .map(|row| row.key)
            .collect();

        if doomed.is_empty() {
            return Ok(());
        }

        let keys: Vec<&str> = doomed.iter().map(String::as_str).collect();
        let removed = self.store.delete_keys(&keys).await?;
        tracing::info!(removed, "cleaned up abandoned lock rows");
        Ok(())
    }
}
