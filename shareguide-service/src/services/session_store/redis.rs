//! This module provides an implementation of [`SessionStore`] using Redis
//! as the external cache, for deployments where multiple service instances
//! share session state.
//!
//! Entries are written with `SET .. EX`, so the TTL renews on every write
//! and Redis evicts sessions whose connection never closed cleanly.

use std::time::Duration;

use async_trait::async_trait;
use eyre::Context as _;
use redis::AsyncCommands as _;
use secrecy::{ExposeSecret as _, SecretString};
use shareguide_core::session::SessionState;
use tracing::instrument;

use crate::services::session_store::SessionStore;

const KEY_PREFIX: &str = "shareguide:session:";

/// The Redis session store wrapping a connection manager that reconnects on
/// broken connections.
pub struct RedisSessionStore {
    connection: redis::aio::ConnectionManager,
    ttl_secs: u64,
}

impl RedisSessionStore {
    /// Initializes a `RedisSessionStore` by connecting to the provided
    /// `connection_string`.
    #[instrument(level = "info", skip_all)]
    pub async fn init(connection_string: &SecretString, ttl: Duration) -> eyre::Result<Self> {
        tracing::info!("connecting to Redis...");
        let client = redis::Client::open(connection_string.expose_secret())
            .context("while parsing Redis connection string")?;
        let connection = client
            .get_connection_manager()
            .await
            .context("while connecting to Redis")?;
        Ok(Self {
            connection,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn key(token: &str) -> String {
        format!("{KEY_PREFIX}{token}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, token: &str) -> eyre::Result<Option<SessionState>> {
        let mut connection = self.connection.clone();
        let serialized: Option<String> = connection
            .get(Self::key(token))
            .await
            .context("while reading session state from Redis")?;
        match serialized {
            Some(serialized) => Ok(Some(
                serde_json::from_str(&serialized)
                    .context("while deserializing stored session state")?,
            )),
            None => Ok(None),
        }
    }

    async fn set(&self, token: &str, state: &SessionState) -> eyre::Result<()> {
        let serialized =
            serde_json::to_string(state).context("while serializing session state")?;
        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(Self::key(token), serialized, self.ttl_secs)
            .await
            .context("while writing session state to Redis")?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> eyre::Result<()> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .del(Self::key(token))
            .await
            .context("while deleting session state from Redis")?;
        Ok(())
    }

    async fn quit(&self) -> eyre::Result<()> {
        // the connection manager closes its connections on drop
        Ok(())
    }
}
