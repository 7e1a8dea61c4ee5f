//! The time source the engine reads.
//!
//! Debouncing, challenge expiry, the TTS gate, and the trust signals all
//! compare timestamps from one clock. Production uses [`SystemClock`];
//! tests inject a manually advanced clock so timing behavior is
//! deterministic.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Dynamic trait object for the clock service.
pub type ClockService = Arc<dyn Clock + Send + Sync>;

/// Milliseconds-since-epoch time source.
pub trait Clock {
    /// The current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is past the epoch")
            .as_millis() as u64
    }
}
