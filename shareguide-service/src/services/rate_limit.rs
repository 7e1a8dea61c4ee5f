//! Per-token sliding-window rate limiting.
//!
//! Each session token gets an independent window counter. Exceeding the
//! limit yields an error reply to the client but never a disconnect; the
//! entry is removed when the connection closes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at_ms: u64,
    count: u32,
}

/// Keeps one message counter per live session token.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    max_messages: u32,
    window_ms: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_messages: u32, window_ms: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_messages,
            window_ms,
        }
    }

    /// Accounts one inbound message for `token`. Returns `true` iff the
    /// message is within the limit.
    pub(crate) fn allow(&self, token: &str, now_ms: u64) -> bool {
        let mut windows = self.windows.lock();
        let window = windows.entry(token.to_owned()).or_insert(Window {
            started_at_ms: now_ms,
            count: 0,
        });
        if now_ms.saturating_sub(window.started_at_ms) >= self.window_ms {
            window.started_at_ms = now_ms;
            window.count = 0;
        }
        if window.count < self.max_messages {
            window.count += 1;
            true
        } else {
            false
        }
    }

    /// Drops the window for `token` (on connection close).
    pub(crate) fn forget(&self, token: &str) {
        self.windows.lock().remove(token);
    }
}
