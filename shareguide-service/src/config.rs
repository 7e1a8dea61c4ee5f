//! Configuration types and CLI/environment parsing for the shareguide
//! service.
//!
//! Concrete deployments may have a more detailed config and can use the
//! exposed [`ShareguideConfig`] and flatten it with `#[clap(flatten)]`.
//! Log filtering is handled by the hosting application through `RUST_LOG`
//! (`tracing-subscriber`'s `EnvFilter`); telemetry export is likewise wired
//! by the host, not this library.
//!
//! Additionally this module defines the [`Environment`] to assert dev-only
//! code.

use std::num::NonZeroU32;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use shareguide_core::limits::Tuning;

/// The environment the service is running in.
///
/// Main usage for the `Environment` is to call
/// [`Environment::assert_is_dev`]. Services that are intended for `dev`
/// only (like the in-memory session store) shall assert that they are
/// called from the `dev` environment. The origin allow-list is only
/// enforced in `prod`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Environment {
    /// Production environment.
    Prod,
    /// Development environment.
    Dev,
}

impl Environment {
    /// Asserts that `Environment` is `dev`. Panics if not the case.
    pub fn assert_is_dev(&self) {
        assert!(matches!(self, Environment::Dev), "Is not dev environment")
    }

    /// Returns `true` iff this is the production environment.
    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

/// The configuration for the shareguide verification service.
///
/// It can be configured via environment variables or command line arguments
/// using `clap`.
#[derive(Parser, Debug)]
pub struct ShareguideConfig {
    /// The environment of the service (either `prod` or `dev`).
    #[clap(long, env = "SHAREGUIDE_ENVIRONMENT", default_value = "prod")]
    pub environment: Environment,

    /// Allowed origins for WebSocket upgrades, comma-separated.
    ///
    /// Only enforced in `prod`: connections with a non-empty `Origin`
    /// header not in this list are rejected.
    #[clap(
        long,
        env = "SHAREGUIDE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = ""
    )]
    pub allowed_origins: Vec<String>,

    /// The connection string for the Postgres DB.
    #[clap(long, env = "SHAREGUIDE_DB_CONNECTION_STRING")]
    pub db_connection_string: SecretString,

    /// Max connections of the DB pool.
    #[clap(long, env = "SHAREGUIDE_DB_MAX_CONNECTIONS", default_value = "3")]
    pub db_max_connections: NonZeroU32,

    /// The URL of the external session cache. If not set, sessions are kept
    /// in an in-memory store (dev only).
    #[clap(long, env = "SHAREGUIDE_SESSION_STORE_URL")]
    pub session_store_url: Option<SecretString>,

    /// TTL for session-store entries.
    #[clap(
        long,
        env = "SHAREGUIDE_SESSION_STORE_TTL",
        default_value = "24h",
        value_parser = humantime::parse_duration
    )]
    pub session_store_ttl: Duration,

    /// Webhook URL notified on session completion.
    #[clap(long, env = "SHAREGUIDE_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Shared secret for the webhook HMAC signature header.
    #[clap(long, env = "SHAREGUIDE_WEBHOOK_SECRET")]
    pub webhook_secret: Option<SecretString>,

    /// Vision provider selector (consumed by the hosting application when
    /// wiring a concrete `VisionAnalyzer`).
    #[clap(long, env = "SHAREGUIDE_VISION_PROVIDER", default_value = "openai")]
    pub vision_provider: String,

    /// Credential for the selected vision provider.
    #[clap(long, env = "SHAREGUIDE_VISION_API_KEY")]
    pub vision_api_key: Option<SecretString>,

    /// TTS provider selector (consumed by the hosting application when
    /// wiring a concrete `SpeechSynthesizer`).
    #[clap(long, env = "SHAREGUIDE_TTS_PROVIDER", default_value = "azure")]
    pub tts_provider: String,

    /// Credential for the selected TTS provider.
    #[clap(long, env = "SHAREGUIDE_TTS_API_KEY")]
    pub tts_api_key: Option<SecretString>,

    /// Max time a WebSocket connection is kept alive.
    #[clap(
        long,
        env = "SHAREGUIDE_MAX_CONNECTION_LIFETIME",
        default_value = "30min",
        value_parser = humantime::parse_duration
    )]
    pub max_connection_lifetime: Duration,

    /// Minimum time between two frame analyses.
    #[clap(
        long,
        env = "SHAREGUIDE_ANALYSIS_DEBOUNCE",
        default_value = "400ms",
        value_parser = humantime::parse_duration
    )]
    pub analysis_debounce: Duration,

    /// Repeated readings required before an extracted value is committed.
    #[clap(long, env = "SHAREGUIDE_CONSENSUS_THRESHOLD", default_value = "2")]
    pub consensus_threshold: u32,

    /// Consecutive matching frames required to advance a step.
    #[clap(long, env = "SHAREGUIDE_SUCCESS_THRESHOLD", default_value = "1")]
    pub success_threshold: u32,

    /// Max inbound messages per rate-limit window and token.
    #[clap(long, env = "SHAREGUIDE_RATE_LIMIT_MAX_MESSAGES", default_value = "50")]
    pub rate_limit_max_messages: u32,

    /// The rate-limit window.
    #[clap(
        long,
        env = "SHAREGUIDE_RATE_LIMIT_WINDOW",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub rate_limit_window: Duration,

    /// TTS quiet period after a link click.
    #[clap(
        long,
        env = "SHAREGUIDE_TTS_QUIET_PERIOD",
        default_value = "4s",
        value_parser = humantime::parse_duration
    )]
    pub tts_quiet_period: Duration,

    /// Time without utterances before prior guidance is re-spoken.
    #[clap(
        long,
        env = "SHAREGUIDE_TTS_STUCK_TIMEOUT",
        default_value = "15s",
        value_parser = humantime::parse_duration
    )]
    pub tts_stuck_timeout: Duration,

    /// Probability that a challenge-carrying step issues a challenge.
    #[clap(long, env = "SHAREGUIDE_CHALLENGE_PROBABILITY", default_value = "0.4")]
    pub challenge_probability: f64,

    /// Default challenge timeout (specs may override per challenge).
    #[clap(
        long,
        env = "SHAREGUIDE_CHALLENGE_TIMEOUT",
        default_value = "15s",
        value_parser = humantime::parse_duration
    )]
    pub challenge_timeout: Duration,
}

impl ShareguideConfig {
    /// Collapses the tunables into the [`Tuning`] record the engine takes.
    pub fn tuning(&self) -> Tuning {
        Tuning {
            debounce_ms: self.analysis_debounce.as_millis() as u64,
            consensus_threshold: self.consensus_threshold,
            success_threshold: self.success_threshold,
            challenge_probability: self.challenge_probability,
            challenge_timeout_ms: self.challenge_timeout.as_millis() as u64,
            tts_quiet_period_ms: self.tts_quiet_period.as_millis() as u64,
            tts_stuck_timeout_ms: self.tts_stuck_timeout.as_millis() as u64,
        }
    }
}
