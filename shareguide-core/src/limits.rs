//! Named tuning constants for the session engine.
//!
//! The constants are the defaults; deployments override them through the
//! service configuration, which builds a [`Tuning`] record passed into the
//! engine.

use serde::{Deserialize, Serialize};

/// Frames arriving sooner than this after the previous analysis are dropped.
pub const ANALYSIS_DEBOUNCE_MS: u64 = 400;

/// Minimum repeated readings of a specific value before it is committed.
pub const CONSENSUS_THRESHOLD: u32 = 2;

/// Consecutive matching frames required to advance a step.
pub const SUCCESS_THRESHOLD: u32 = 1;

/// Probability that a challenge-carrying step issues a challenge.
pub const CHALLENGE_PROBABILITY: f64 = 0.4;

/// Challenge timeout when the challenge spec does not override it.
pub const DEFAULT_CHALLENGE_TIMEOUT_MS: u64 = 15_000;

/// Non-scripted TTS is suppressed for this long after a link click.
pub const TTS_QUIET_PERIOD_MS: u64 = 4_000;

/// Prior guidance is re-spoken after this long without any utterance.
pub const TTS_STUCK_TIMEOUT_MS: u64 = 15_000;

/// Frame-timestamp and frame-hash rings hold at most this many entries.
pub const FRAME_RING_CAPACITY: usize = 100;

/// Inter-frame intervals below this count as suspiciously fast.
pub const FAST_INTERVAL_MS: u64 = 200;

/// Confidence must exceed this for a matching frame to count as a success.
pub const SUCCESS_CONFIDENCE_FLOOR: f64 = 0.7;

/// The engine tunables, defaulting to the constants in this module.
///
/// `Copy` so the engine can hand it freely to the pure decision functions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Tuning {
    /// See [`ANALYSIS_DEBOUNCE_MS`].
    pub debounce_ms: u64,
    /// See [`CONSENSUS_THRESHOLD`].
    pub consensus_threshold: u32,
    /// See [`SUCCESS_THRESHOLD`].
    pub success_threshold: u32,
    /// See [`CHALLENGE_PROBABILITY`].
    pub challenge_probability: f64,
    /// See [`DEFAULT_CHALLENGE_TIMEOUT_MS`].
    pub challenge_timeout_ms: u64,
    /// See [`TTS_QUIET_PERIOD_MS`].
    pub tts_quiet_period_ms: u64,
    /// See [`TTS_STUCK_TIMEOUT_MS`].
    pub tts_stuck_timeout_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            debounce_ms: ANALYSIS_DEBOUNCE_MS,
            consensus_threshold: CONSENSUS_THRESHOLD,
            success_threshold: SUCCESS_THRESHOLD,
            challenge_probability: CHALLENGE_PROBABILITY,
            challenge_timeout_ms: DEFAULT_CHALLENGE_TIMEOUT_MS,
            tts_quiet_period_ms: TTS_QUIET_PERIOD_MS,
            tts_stuck_timeout_ms: TTS_STUCK_TIMEOUT_MS,
        }
    }
}
