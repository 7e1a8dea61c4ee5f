//! The database boundary of the engine.
//!
//! This module defines the [`SessionRepository`] trait the engine reads
//! session rows and templates through, and writes progress and completion
//! back through. The engine only ever touches `current_step`, `status`,
//! `metadata`, and `updated_at` on session rows.
//!
//! Current `SessionRepository` implementations:
//! - Postgres

use std::sync::Arc;

use async_trait::async_trait;
use shareguide_types::template::Template;
use uuid::Uuid;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Dynamic trait object for the repository service.
///
/// Must be `Send + Sync` to work with async contexts (e.g., Axum).
pub type SessionRepositoryService = Arc<dyn SessionRepository + Send + Sync>;

/// Session row status values the engine reads and writes.
pub mod session_status {
    /// The session link has not been fully used yet.
    pub const PENDING: &str = "pending";
    /// The session completed all steps.
    pub const COMPLETED: &str = "completed";
    /// The session expired before completing.
    pub const EXPIRED: &str = "expired";
}

/// The slice of a `sessions` row the engine reads.
#[derive(Clone, Debug)]
pub struct SessionRow {
    /// Session id.
    pub id: Uuid,
    /// The one-time share token.
    pub token: String,
    /// The template this session runs.
    pub template_id: Uuid,
    /// Row status, see [`session_status`].
    pub status: String,
    /// Persisted step index.
    pub current_step: i32,
    /// Metadata JSON (committed extracted data, completion record).
    pub metadata: Option<serde_json::Value>,
    /// Expiry as milliseconds since the Unix epoch.
    pub expires_at_ms: Option<i64>,
}

impl SessionRow {
    /// Whether the row is expired at `now_ms`, either explicitly or by its
    /// deadline.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.status == session_status::EXPIRED
            || self
                .expires_at_ms
                .is_some_and(|expires_at| expires_at < now_ms as i64)
    }

    /// The committed extracted data persisted in the metadata JSON, for
    /// rehydration on reconnect.
    pub fn recovered_extraction(&self) -> Vec<shareguide_types::analysis::ExtractedField> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("extractedData"))
            .and_then(|fields| serde_json::from_value(fields.clone()).ok())
            .unwrap_or_default()
    }
}

/// Trait that repository implementations must provide.
#[async_trait]
pub trait SessionRepository {
    /// Loads the session row for `token`.
    async fn find_session(&self, token: &str) -> eyre::Result<Option<SessionRow>>;

    /// Loads a template by id.
    async fn find_template(&self, id: Uuid) -> eyre::Result<Option<Template>>;

    /// Persists a new step index for `token`.
    async fn update_progress(&self, token: &str, current_step: usize) -> eyre::Result<()>;

    /// Persists the metadata JSON for `token` (incremental extracted-data
    /// writes).
    async fn save_metadata(&self, token: &str, metadata: &serde_json::Value)
    -> eyre::Result<()>;

    /// Marks the session completed and persists the final metadata.
    async fn complete_session(
        &self,
        token: &str,
        metadata: &serde_json::Value,
    ) -> eyre::Result<()>;
}
