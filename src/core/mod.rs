//! Core infrastructure: configuration, errors, time.

pub mod config;
pub mod error;
pub mod time;

pub use self::config::Config;
pub use self::error::{TrellisError, TrellisResult};
pub use self::time::{Clock, ManualClock, Millis, SystemClock};
