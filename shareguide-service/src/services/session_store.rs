//! Session store interface for the shareguide engine.
//!
//! This module defines the [`SessionStore`] trait, which maps session
//! tokens to serialized [`SessionState`] with a TTL. The engine writes the
//! state back after every handled message; the store's TTL is the only
//! eviction for sessions whose connection never closes cleanly.
//!
//! Current `SessionStore` implementations:
//! - in-memory (dev)
//! - Redis (external cache)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Context as _;
use parking_lot::Mutex;
use shareguide_core::session::SessionState;

use crate::config::Environment;
use crate::services::clock::ClockService;

#[cfg(feature = "redis")]
pub mod redis;

/// Dynamic trait object for the session store service.
///
/// Must be `Send + Sync` to work with async contexts (e.g., Axum).
pub type SessionStoreService = Arc<dyn SessionStore + Send + Sync>;

/// Trait that session store implementations must provide.
///
/// Handles persistence of [`SessionState`] keyed by the session token.
#[async_trait]
pub trait SessionStore {
    /// Returns the state stored under `token`, if present and not expired.
    async fn get(&self, token: &str) -> eyre::Result<Option<SessionState>>;

    /// Stores `state` under `token` with the store's TTL.
    async fn set(&self, token: &str, state: &SessionState) -> eyre::Result<()>;

    /// Removes the state stored under `token`.
    async fn delete(&self, token: &str) -> eyre::Result<()>;

    /// Releases the store's resources.
    async fn quit(&self) -> eyre::Result<()>;
}

/// The in-memory session store used in dev deployments and tests.
///
/// Entries carry an absolute deadline and are evicted opportunistically on
/// access.
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    clock: ClockService,
}

struct Entry {
    state: String,
    expires_at_ms: u64,
}

impl InMemorySessionStore {
    /// Creates an empty in-memory store.
    ///
    /// # Panics
    ///
    /// Panics when called outside the `dev` environment.
    pub fn new(environment: Environment, ttl: Duration, clock: ClockService) -> Self {
        environment.assert_is_dev();
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, token: &str) -> eyre::Result<Option<SessionState>> {
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries.lock();
        match entries.get(token) {
            Some(entry) if entry.expires_at_ms > now_ms => {
                let state = serde_json::from_str(&entry.state)
                    .context("while deserializing stored session state")?;
                Ok(Some(state))
            }
            Some(_) => {
                entries.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, token: &str, state: &SessionState) -> eyre::Result<()> {
        let serialized =
            serde_json::to_string(state).context("while serializing session state")?;
        let expires_at_ms = self.clock.now_ms() + self.ttl.as_millis() as u64;
        self.entries.lock().insert(
            token.to_owned(),
            Entry {
                state: serialized,
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn delete(&self, token: &str) -> eyre::Result<()> {
        self.entries.lock().remove(token);
        Ok(())
    }

    async fn quit(&self) -> eyre::Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
