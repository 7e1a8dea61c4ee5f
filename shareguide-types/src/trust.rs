//! The advisory trust report produced at session completion.
//!
//! The report summarizes anti-forgery signals collected per frame during the
//! session. It is persisted into the session's metadata and forwarded to the
//! completion webhook; the score is advisory and never blocks the user.

use serde::{Deserialize, Serialize};

/// The composite trust report: a `0..=1` score, the raw signals, and the
/// flags raised while scoring.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustReport {
    /// Composite score in `[0, 1]`, rounded to two decimal places.
    pub score: f64,
    /// The raw signals the score was derived from.
    pub signals: TrustSignals,
    /// Flags raised while scoring (e.g. `timing_too_uniform`).
    pub flags: Vec<String>,
}

/// The raw per-session signals materialized at completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustSignals {
    /// URL verification summary.
    pub url: UrlSignal,
    /// Latest interaction-challenge outcome.
    pub challenge: ChallengeSignal,
    /// Milliseconds between session start and completion.
    pub session_duration_ms: u64,
    /// Total frames analyzed.
    pub frames_analyzed: u32,
    /// The display surface the client reported (e.g. `monitor`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_surface: Option<String>,
    /// Frame-interval statistics, when at least 3 timestamps were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalSignal>,
    /// Frame-hash statistics, when at least 3 hashes were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_similarity: Option<SimilaritySignal>,
    /// Visual continuity assessment, when at least 1 verdict was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_continuity: Option<ContinuitySignal>,
}

/// URL verification counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlSignal {
    /// True iff at least one frame verified and none failed verification.
    pub verified: bool,
    /// Frames whose visible URL matched the expected host.
    pub verified_frames: u32,
    /// Frames whose visible URL did not match.
    pub unverified_frames: u32,
    /// `verified / (verified + unverified)`, `0` when nothing was checked.
    pub ratio: f64,
}

/// The latest interaction-challenge outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSignal {
    /// `passed`, `failed`, or `none`.
    pub outcome: ChallengeOutcomeKind,
    /// Response time of the latest challenge, if one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// Challenge outcome discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeOutcomeKind {
    /// The challenge was fulfilled within its timeout.
    Passed,
    /// The challenge timed out.
    Failed,
    /// No challenge was issued during the session.
    None,
}

/// Frame-interval timing statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalSignal {
    /// Mean inter-frame interval.
    pub mean_interval_ms: f64,
    /// Population standard deviation of the intervals.
    pub std_dev_ms: f64,
    /// Coefficient of variation (`std_dev / mean`).
    pub coefficient_of_variation: f64,
    /// Intervals shorter than 200 ms that coincided with a hash change.
    pub fast_intervals: u32,
    /// Total intervals considered.
    pub total_intervals: u32,
}

/// Frame-hash similarity statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilaritySignal {
    /// Consecutive equal hash pairs.
    pub duplicate_pairs: u32,
    /// Three-in-a-row all-distinct hash windows (splice stitches).
    pub abrupt_changes: u32,
    /// Total hash transitions considered.
    pub total_transitions: u32,
    /// Unique hashes over total transitions.
    pub unique_ratio: f64,
}

/// Per-frame AI visual-continuity counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuitySignal {
    /// Frames assessed as continuous with their predecessor.
    pub consistent_frames: u32,
    /// Frames assessed as discontinuous.
    pub discontinuous_frames: u32,
}
