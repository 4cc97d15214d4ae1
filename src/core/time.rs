//! Wall-clock utilities.
//!
//! Every timestamp Trellis persists (row expiry, lock descriptors) is a
//! unix-epoch millisecond count, sampled through the [`Clock`] trait so
//! tests can drive expiry without sleeping. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// A unix-epoch timestamp in milliseconds.
///
/// Stored as `INTEGER` in the record store and embedded as a plain number
/// in lock descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millis {
    /// Milliseconds since the unix epoch.
    pub ms: i64,
}

impl Millis {
    /// Create a timestamp from a raw millisecond count.
    pub const fn new(ms: i64) -> Self {
        Self { ms }
    }

    /// Advance this timestamp by a duration, saturating on overflow.
    pub fn add(self, d: Duration) -> Self {
        Self {
            ms: self.ms.saturating_add(d.as_millis() as i64),
        }
    }

    /// Check if this timestamp is at or after the given deadline.
    pub const fn is_at_or_after(self, deadline: Millis) -> bool {
        self.ms >= deadline.ms
    }

    /// Check if this timestamp is strictly before the given deadline.
    pub const fn is_before(self, deadline: Millis) -> bool {
        self.ms < deadline.ms
    }

    /// Milliseconds elapsed since an earlier timestamp.
    ///
    /// Negative if `earlier` is actually in the future (clock skew between
    /// writers); callers treat that as "not elapsed".
    pub const fn since(self, earlier: Millis) -> i64 {
        self.ms - earlier.ms
    }
}

impl std::fmt::Display for Millis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.ms)
    }
}

/// Source of the current time.
///
/// Exactly one clock backs a `CacheClient` and all locks it constructs, so
/// expiry decisions inside one facade are mutually consistent.
pub trait Clock: Send + Sync {
    /// Current unix time in milliseconds.
    fn now(&self) -> Millis;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Millis::new(now)
    }
}

/// Externally-driven clock for tests.
///
/// Starts at a fixed instant and only moves when told to, which makes TTL
/// expiry and lock staleness reproducible without real sleeps.
#[derive(Debug)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    /// Create a manual clock at the given starting instant.
    pub fn new(start: Millis) -> Self {
        Self {
            ms: AtomicI64::new(start.ms),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: Millis) {
        self.ms.store(at.ms, Ordering::Release);
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, d: Duration) {
        self.ms.fetch_add(d.as_millis() as i64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        Millis::new(self.ms.load(Ordering::Acquire))
    }
}
