//! This module provides an implementation of [`SessionRepository`] using a
//! Postgres database.
//!
//! Timestamps are stored as `BIGINT` milliseconds since the Unix epoch and
//! template steps as a JSON `TEXT` column, so no date/time types cross the
//! wire.

use std::num::NonZeroU32;

use async_trait::async_trait;
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use shareguide_types::template::{Template, TemplateStep};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::services::clock::ClockService;
use crate::services::repository::{SessionRepository, SessionRow, session_status};

/// The postgres repository wrapping a `PgPool`.
pub struct PostgresSessionRepository {
    pool: PgPool,
    clock: ClockService,
}

#[derive(Debug, sqlx::FromRow)]
struct DbSessionRow {
    id: Uuid,
    token: String,
    template_id: Uuid,
    status: String,
    current_step: i32,
    metadata: Option<String>,
    expires_at: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct DbTemplateRow {
    id: Uuid,
    name: String,
    platform: String,
    steps: String,
}

impl TryFrom<DbSessionRow> for SessionRow {
    type Error = eyre::Report;

    fn try_from(row: DbSessionRow) -> Result<Self, Self::Error> {
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("while parsing session metadata JSON")?;
        Ok(SessionRow {
            id: row.id,
            token: row.token,
            template_id: row.template_id,
            status: row.status,
            current_step: row.current_step,
            metadata,
            expires_at_ms: row.expires_at,
        })
    }
}

impl TryFrom<DbTemplateRow> for Template {
    type Error = eyre::Report;

    fn try_from(row: DbTemplateRow) -> Result<Self, Self::Error> {
        let steps: Vec<TemplateStep> =
            serde_json::from_str(&row.steps).context("while parsing template steps JSON")?;
        Ok(Template {
            id: row.id,
            name: row.name,
            platform: row.platform,
            steps,
        })
    }
}

impl PostgresSessionRepository {
    /// Initializes a `PostgresSessionRepository` by connecting to the
    /// provided `connection_string`.
    #[instrument(level = "info", skip_all)]
    pub async fn init(
        connection_string: &SecretString,
        max_connections: NonZeroU32,
        clock: ClockService,
    ) -> eyre::Result<Self> {
        tracing::info!("connecting to DB...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .connect(connection_string.expose_secret())
            .await
            .context("while connecting to postgres DB")?;
        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    #[instrument(level = "debug", skip_all)]
    async fn find_session(&self, token: &str) -> eyre::Result<Option<SessionRow>> {
        let maybe_row: Option<DbSessionRow> = sqlx::query_as(
            r#"
                SELECT
                    id,
                    token,
                    template_id,
                    status,
                    current_step,
                    metadata,
                    expires_at
                FROM sessions
                WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("while fetching session row")?;
        maybe_row.map(SessionRow::try_from).transpose()
    }

    #[instrument(level = "debug", skip_all)]
    async fn find_template(&self, id: Uuid) -> eyre::Result<Option<Template>> {
        let maybe_row: Option<DbTemplateRow> = sqlx::query_as(
            r#"
                SELECT
                    id,
                    name,
                    platform,
                    steps
                FROM templates
                WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("while fetching template row")?;
        maybe_row.map(Template::try_from).transpose()
    }

    #[instrument(level = "debug", skip_all)]
    async fn update_progress(&self, token: &str, current_step: usize) -> eyre::Result<()> {
        sqlx::query(
            r#"
                UPDATE sessions
                SET current_step = $2, updated_at = $3
                WHERE token = $1
            "#,
        )
        .bind(token)
        .bind(current_step as i32)
        .bind(self.clock.now_ms() as i64)
        .execute(&self.pool)
        .await
        .context("while updating session progress")?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all)]
    async fn save_metadata(
        &self,
        token: &str,
        metadata: &serde_json::Value,
    ) -> eyre::Result<()> {
        sqlx::query(
            r#"
                UPDATE sessions
                SET metadata = $2, updated_at = $3
                WHERE token = $1
            "#,
        )
        .bind(token)
        .bind(metadata.to_string())
        .bind(self.clock.now_ms() as i64)
        .execute(&self.pool)
        .await
        .context("while saving session metadata")?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all)]
    async fn complete_session(
        &self,
        token: &str,
        metadata: &serde_json::Value,
    ) -> eyre::Result<()> {
        sqlx::query(
            r#"
                UPDATE sessions
                SET status = $2, metadata = $3, updated_at = $4
                WHERE token = $1
            "#,
        )
        .bind(token)
        .bind(session_status::COMPLETED)
        .bind(metadata.to_string())
        .bind(self.clock.now_ms() as i64)
        .execute(&self.pool)
        .await
        .context("while completing session")?;
        Ok(())
    }
}
