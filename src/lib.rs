//! Trellis - cache and lease-lock emulation over a shared relational table.
//!
//! Trellis reproduces a useful subset of an in-memory key-value/lock
//! service — string values with TTLs, counters, a sorted-set-like blob,
//! and a named mutual-exclusion lease — on top of one uniquely-keyed
//! relational table, for deployments where a dedicated cache service is
//! unavailable. The relational engine contributes row uniqueness,
//! transactions, and conditional updates with affected-row counts; Trellis
//! builds everything else from those three primitives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Callers                               │
//! │        get/set/setnx/incr/expire/zadd/... │ lock scopes         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │       Command Emulator       │   │          Lease Lock          │
//! │  per-command transactions,   │   │  CAS takeover, identity-     │
//! │  degrade-to-miss boundary    │   │  fenced release              │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Record Store                            │
//! │   one `entries` table: upsert │ insert-or-ignore │ guarded      │
//! │   update │ expiry delete   (SQLite via sqlx)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  ▲
//!                     ┌────────────┴────────────┐
//!                     │      Expiry Sweeper     │
//!                     │  background TTL reaping │
//!                     └─────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and the degrade boundary
//! - [`core::time`] - Millisecond timestamps and the pluggable clock
//!
//! ## Storage
//! - [`store`] - The shared `entries` table and its access primitives
//!
//! ## Commands
//! - [`cache`] - The emulated command surface ([`cache::CacheClient`])
//! - [`cache::zset`] - Encoded score-map payloads
//! - [`cache::sweeper`] - Background expiry sweeping
//!
//! ## Locking
//! - [`lock`] - Lease locks with stale-holder takeover
//!
//! ## CLI
//! - [`cli`] - Demonstration harness and maintenance commands
//!
//! # Key Invariants
//!
//! - One visible row per key, enforced by the table's uniqueness constraint
//! - Expired rows are logically absent to reads before they are physically
//!   deleted; the sweeper only reclaims space
//! - Lock takeover happens only through a value-guarded conditional update,
//!   so racing acquirers cannot both win
//! - Storage faults never cross the command boundary; the cache degrades
//!   to "always miss" instead of failing its caller

// Core infrastructure
pub mod core;

// Storage layer
pub mod store;

// Command emulation
pub mod cache;

// Lease locking
pub mod lock;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::cache::{CacheClient, Sweeper};
pub use self::core::{config, error, time};
pub use self::core::{Config, TrellisError, TrellisResult};
pub use self::lock::{LeaseLock, LockDescriptor, OwnerIdentity};
pub use self::store::{Entry, RecordStore};
