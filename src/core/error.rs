//! Error types.
//!
//! The command emulator and the lease lock form an error boundary: storage
//! faults below them are logged and converted to safe defaults, never
//! propagated. [`TrellisError`] is therefore mostly an *internal* currency
//! between the record store and the layers above it. The one variant a
//! caller can observe is [`TrellisError::LockUnavailable`], raised by the
//! scoped lock helper when acquisition fails.

use thiserror::Error;

/// Errors produced below the command boundary.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// The relational engine rejected or lost a statement.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A payload could not be encoded for storage.
    ///
    /// Decoding failures never surface as this variant; stored payloads
    /// that fail to decode are treated as absent/empty (self-healing).
    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A scoped lock body could not run because acquisition failed.
    #[error("lock '{name}' unavailable")]
    LockUnavailable { name: String },
}

impl TrellisError {
    /// Check if this error came from the storage engine.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type using TrellisError.
pub type TrellisResult<T> = Result<T, TrellisError>;
