//! Metrics definitions for the shareguide service.
//!
//! This module defines all metrics keys used by the service and provides a
//! helper [`describe_metrics`] to set metadata for each metric using the
//! `metrics` crate.

/// Metrics key for counting currently connected sessions.
pub const METRICS_ID_SESSIONS_OPEN: &str = "shareguide.sessions.open";
/// Metrics key for counting completed sessions.
pub const METRICS_ID_SESSIONS_COMPLETED: &str = "shareguide.sessions.completed";
/// Metrics key for connections torn down by the lifetime cap.
pub const METRICS_ID_SESSIONS_TIMEOUT: &str = "shareguide.sessions.timeout";
/// Metrics key for frames handed to the vision model.
pub const METRICS_ID_FRAMES_ANALYZED: &str = "shareguide.frames.analyzed";
/// Metrics key for inbound messages dropped by the rate limiter.
pub const METRICS_ID_MESSAGES_RATE_LIMITED: &str = "shareguide.messages.rate_limited";
/// Metrics key for the duration of vision analysis calls.
pub const METRICS_ID_VISION_DURATION: &str = "shareguide.vision.duration";
/// Metrics key for the duration of TTS synthesis calls.
pub const METRICS_ID_TTS_DURATION: &str = "shareguide.tts.duration";
/// Metrics key for interaction challenges issued.
pub const METRICS_ID_CHALLENGES_ISSUED: &str = "shareguide.challenges.issued";
/// Metrics key for completion webhooks that could not be delivered.
pub const METRICS_ID_WEBHOOK_FAILURES: &str = "shareguide.webhook.failures";

/// Describe all metrics used by the service.
///
/// This calls the `describe_*` functions from the `metrics` crate to set
/// metadata on the different metrics.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_SESSIONS_OPEN,
        metrics::Unit::Count,
        "Number of currently connected guided sessions"
    );

    metrics::describe_counter!(
        METRICS_ID_SESSIONS_COMPLETED,
        metrics::Unit::Count,
        "Number of sessions that completed all steps"
    );

    metrics::describe_counter!(
        METRICS_ID_SESSIONS_TIMEOUT,
        metrics::Unit::Count,
        "Number of connections closed because they exceeded the lifetime cap"
    );

    metrics::describe_counter!(
        METRICS_ID_FRAMES_ANALYZED,
        metrics::Unit::Count,
        "Number of frames handed to the vision model"
    );

    metrics::describe_counter!(
        METRICS_ID_MESSAGES_RATE_LIMITED,
        metrics::Unit::Count,
        "Number of inbound messages dropped by the per-token rate limiter"
    );

    metrics::describe_histogram!(
        METRICS_ID_VISION_DURATION,
        metrics::Unit::Milliseconds,
        "Duration of vision analysis calls"
    );

    metrics::describe_histogram!(
        METRICS_ID_TTS_DURATION,
        metrics::Unit::Milliseconds,
        "Duration of TTS synthesis calls"
    );

    metrics::describe_counter!(
        METRICS_ID_CHALLENGES_ISSUED,
        metrics::Unit::Count,
        "Number of interaction challenges issued"
    );

    metrics::describe_counter!(
        METRICS_ID_WEBHOOK_FAILURES,
        metrics::Unit::Count,
        "Number of completion webhooks that could not be delivered"
    )
}
