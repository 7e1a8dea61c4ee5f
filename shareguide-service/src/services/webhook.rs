//! Best-effort completion notifications.
//!
//! When a session completes, the engine fires a single POST to the
//! configured webhook URL. Delivery is best-effort: failures are logged and
//! counted, never propagated and never retried. When a shared secret is
//! configured, the body is signed with HMAC-SHA256 and the hex digest sent
//! in the `X-Webhook-Signature` header.

use std::time::Duration;

use hmac::{Hmac, Mac as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use sha2::Sha256;
use shareguide_types::analysis::ExtractedField;
use shareguide_types::trust::TrustReport;
use tracing::instrument;
use uuid::Uuid;

use crate::metrics::METRICS_ID_WEBHOOK_FAILURES;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// The completion event body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent<'a> {
    /// Always `session.completed`.
    pub event: &'static str,
    /// The completed session.
    pub session_id: Uuid,
    /// Platform tag of the session's template.
    pub platform: &'a str,
    /// The committed extracted data.
    pub extracted_data: &'a [ExtractedField],
    /// Completion time, ISO 8601.
    pub completed_at: &'a str,
    /// The trust report.
    pub trust: &'a TrustReport,
}

/// Posts completion events to a configured URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<SecretString>,
}

impl WebhookNotifier {
    /// Creates a notifier for `url`, signing bodies with `secret` when
    /// provided.
    pub fn new(url: String, secret: Option<SecretString>) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    /// Delivers one completion event. Failures are logged and swallowed.
    #[instrument(level = "debug", skip_all, fields(session_id = %event.session_id))]
    pub async fn notify_completion(&self, event: &CompletionEvent<'_>) {
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!("could not serialize webhook body: {err:?}");
                ::metrics::counter!(METRICS_ID_WEBHOOK_FAILURES).increment(1);
                return;
            }
        };
        let mut request = self
            .client
            .post(&self.url)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(
                SIGNATURE_HEADER,
                sign(secret.expose_secret().as_bytes(), &body),
            );
        }
        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("webhook delivered: {}", response.status());
            }
            Ok(response) => {
                tracing::warn!("webhook rejected with status {}", response.status());
                ::metrics::counter!(METRICS_ID_WEBHOOK_FAILURES).increment(1);
            }
            Err(err) => {
                tracing::warn!("could not deliver webhook: {err:?}");
                ::metrics::counter!(METRICS_ID_WEBHOOK_FAILURES).increment(1);
            }
        }
    }
}

/// `hex(HMAC-SHA256(secret, body))`.
fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
