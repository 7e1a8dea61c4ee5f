#![deny(missing_docs)]
//! This crate provides the core functionality of the shareguide guided
//! screen-capture verification service.
//!
//! A user opens a one-time share link, grants screen capture, and the
//! service steers them through the ordered steps of a verification
//! template: per-frame screenshots stream in over a WebSocket, a vision
//! model scores each frame against the step's success criterion and
//! extracts structured fields, and a TTS model produces spoken guidance.
//! Upon completion the service persists the extracted values plus a
//! composite trust score and optionally notifies a webhook.
//!
//! Hosting applications use the [`ShareguideServiceBuilder`] to assemble
//! the service: they provide the database repository, the session store,
//! and the vision/TTS providers (any implementation of the port traits in
//! [`services`]), and receive an `axum::Router` to incorporate into a
//! larger server. The provided `CancellationToken` can be cancelled to
//! signal live sessions to shut down gracefully.
//!
//! Clients connect via WebSocket to `/ws/{token}`. Axum supports both
//! HTTP/1.1 and HTTP/2.0 WebSocket connections, therefore we accept
//! connections with `any`. If you want to enable HTTP/2.0, you either have
//! to do it by hand or by calling `axum::serve`, which enables HTTP/2.0 by
//! default.
//!
//! The general workflow of one session is as follows:
//! 1) The client connects with its one-time token. The service loads the
//!    session row and template, hydrates the per-session state, and sends
//!    `connected` plus the spoken first instruction.
//! 2) The client streams `frame` messages. Each frame is debounced, gated
//!    behind the step's link click, scored by the vision provider, and fed
//!    into the extraction consensus and the trust-signal accumulator.
//!    Matching frames advance the step machine; occasionally a random
//!    interaction challenge is injected and verified against subsequent
//!    frames.
//! 3) After the last step the service persists the committed extracted
//!    data and the trust report, fires the completion webhook best-effort,
//!    and sends `completed`.

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::api::session::SessionArgs;
use crate::config::ShareguideConfig;
use crate::metrics::METRICS_ID_SESSIONS_OPEN;
use crate::services::clock::{ClockService, SystemClock};
use crate::services::engine::EngineDeps;
use crate::services::rate_limit::RateLimiter;
use crate::services::repository::SessionRepositoryService;
use crate::services::session_store::SessionStoreService;
use crate::services::tts::TtsService;
use crate::services::vision::VisionService;
use crate::services::webhook::WebhookNotifier;

pub(crate) mod api;
pub mod config;
pub mod metrics;
pub mod services;

/// [`ShareguideServiceBuilder`] to assemble the verification service from
/// its pluggable parts.
pub struct ShareguideServiceBuilder {
    config: ShareguideConfig,
    repository: SessionRepositoryService,
    store: SessionStoreService,
    vision: VisionService,
    tts: TtsService,
    webhook: Option<Arc<WebhookNotifier>>,
    clock: ClockService,
    rng_seed: Option<u64>,
    root: Router,
    cancellation_token: CancellationToken,
}

impl ShareguideServiceBuilder {
    /// Initializes the shareguide service.
    ///
    /// The hosting application selects and constructs the pluggable parts:
    ///
    /// - `repository`: the database boundary (e.g.
    ///   [`services::repository::postgres::PostgresSessionRepository`]).
    /// - `store`: the session store (in-memory for dev, Redis for prod).
    /// - `vision` / `tts`: the model providers.
    ///
    /// When the config carries a webhook URL, completion events are posted
    /// there best-effort (signed when a secret is configured).
    pub fn init(
        config: ShareguideConfig,
        repository: SessionRepositoryService,
        store: SessionStoreService,
        vision: VisionService,
        tts: TtsService,
        cancellation_token: CancellationToken,
    ) -> eyre::Result<Self> {
        ::metrics::gauge!(METRICS_ID_SESSIONS_OPEN).set(0);
        let webhook = config
            .webhook_url
            .as_ref()
            .map(|url| {
                tracing::info!("completion webhook configured: {url}");
                WebhookNotifier::new(url.clone(), config.webhook_secret.clone())
            })
            .transpose()?
            .map(Arc::new);
        let root = Router::new().merge(api::info::routes());
        Ok(Self {
            config,
            repository,
            store,
            vision,
            tts,
            webhook,
            clock: Arc::new(SystemClock),
            rng_seed: None,
            root,
            cancellation_token,
        })
    }

    /// Overrides the engine's time source. Intended for tests that need a
    /// deterministic clock.
    pub fn with_clock(mut self, clock: ClockService) -> Self {
        self.clock = clock;
        self
    }

    /// Seeds the per-connection RNG (challenge coin, challenge and hint
    /// selection). Intended for deterministic tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the `axum` [`Router`] serving the info endpoints and the
    /// guided-session WebSocket under `/ws/{token}`.
    pub fn build(self) -> Router {
        let allowed_origins: Vec<String> = self
            .config
            .allowed_origins
            .iter()
            .filter(|origin| !origin.is_empty())
            .cloned()
            .collect();
        let rate_limiter = RateLimiter::new(
            self.config.rate_limit_max_messages,
            self.config.rate_limit_window.as_millis() as u64,
        );
        let engine_deps = EngineDeps {
            repository: self.repository,
            store: self.store,
            vision: self.vision,
            tts: self.tts,
            webhook: self.webhook,
            clock: self.clock,
            tuning: self.config.tuning(),
            rng_seed: self.rng_seed,
        };
        let session_routes = api::session::routes(SessionArgs {
            environment: self.config.environment,
            allowed_origins: Arc::new(allowed_origins),
            engine_deps,
            rate_limiter,
            max_connection_lifetime: self.config.max_connection_lifetime,
            cancellation_token: self.cancellation_token,
        });
        self.root
            .nest("/ws", session_routes)
            .layer(TraceLayer::new_for_http())
    }
}
