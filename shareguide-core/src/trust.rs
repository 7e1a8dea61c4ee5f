//! Per-frame trust-signal accumulation and the completion scorer.
//!
//! During a session the engine feeds every analyzed frame into a
//! [`TrustAccumulator`]. At completion the accumulator is materialized into
//! a [`TrustReport`]: a weighted 0..=1 composite over URL verification,
//! challenge outcome, session duration, frame coverage, display surface,
//! frame timing, frame-hash similarity, and visual continuity.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use shareguide_types::trust::{
    ChallengeOutcomeKind, ChallengeSignal, ContinuitySignal, SimilaritySignal, TemporalSignal,
    TrustReport, TrustSignals, UrlSignal,
};

use crate::challenge::ChallengeOutcome;
use crate::limits::{FAST_INTERVAL_MS, FRAME_RING_CAPACITY};

/// Scoring weights; the full composite sums to 1.0.
mod weights {
    pub const URL: f64 = 0.20;
    pub const CHALLENGE_RESOLVED: f64 = 0.25;
    pub const CHALLENGE_NONE: f64 = 0.15;
    pub const DURATION_FULL: f64 = 0.10;
    pub const DURATION_FAST: f64 = 0.03;
    pub const DURATION_SLOW: f64 = 0.05;
    pub const FRAMES_FULL: f64 = 0.05;
    pub const FRAMES_LOW: f64 = 0.025;
    pub const SURFACE_FULL: f64 = 0.05;
    pub const SURFACE_PARTIAL: f64 = 0.025;
    pub const TEMPORAL_FULL: f64 = 0.15;
    pub const TEMPORAL_UNIFORM_PENALTY: f64 = 0.10;
    pub const TEMPORAL_FAST_PENALTY: f64 = 0.05;
    pub const SIMILARITY_FULL: f64 = 0.10;
    pub const SIMILARITY_REPLAY_PENALTY: f64 = 0.04;
    pub const SIMILARITY_LOOP_PENALTY: f64 = 0.04;
    pub const SIMILARITY_SPLICE_PENALTY: f64 = 0.02;
    pub const CONTINUITY_FULL: f64 = 0.10;
    pub const CONTINUITY_PARTIAL: f64 = 0.05;
}

const MIN_SESSION_DURATION_MS: u64 = 15_000;
const MAX_SESSION_DURATION_MS: u64 = 300_000;

/// Per-frame anti-forgery signal accumulator for one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustAccumulator {
    url_verified_frames: u32,
    url_unverified_frames: u32,
    frames_analyzed: u32,
    session_started_at_ms: u64,
    display_surface: Option<String>,
    client_platform: Option<String>,
    frame_timestamps: VecDeque<u64>,
    frame_hashes: VecDeque<String>,
    continuity_consistent: u32,
    continuity_discontinuous: u32,
    previous_frame_description: Option<String>,
}

impl TrustAccumulator {
    /// Creates an accumulator with the session-start timestamp.
    pub fn new(now_ms: u64) -> Self {
        Self {
            url_verified_frames: 0,
            url_unverified_frames: 0,
            frames_analyzed: 0,
            session_started_at_ms: now_ms,
            display_surface: None,
            client_platform: None,
            frame_timestamps: VecDeque::new(),
            frame_hashes: VecDeque::new(),
            continuity_consistent: 0,
            continuity_discontinuous: 0,
            previous_frame_description: None,
        }
    }

    /// Appends a frame arrival timestamp; oldest entries are evicted past
    /// the ring capacity.
    pub fn record_frame_timestamp(&mut self, now_ms: u64) {
        push_capped(&mut self.frame_timestamps, now_ms);
    }

    /// Appends a client-supplied frame hash to the hash ring.
    pub fn record_frame_hash(&mut self, hash: String) {
        push_capped(&mut self.frame_hashes, hash);
    }

    /// Records a URL verification verdict.
    ///
    /// Both counters only move when the step asserts an expected host, so
    /// steps without domain assertions never penalize trust.
    pub fn record_url_verdict(&mut self, verdict: Option<bool>, step_has_expected_domain: bool) {
        if !step_has_expected_domain {
            return;
        }
        match verdict {
            Some(true) => self.url_verified_frames += 1,
            Some(false) => self.url_unverified_frames += 1,
            None => {}
        }
    }

    /// Records the per-frame AI continuity verdict (absent on the first
    /// frame).
    pub fn record_continuity(&mut self, verdict: Option<bool>) {
        match verdict {
            Some(true) => self.continuity_consistent += 1,
            Some(false) => self.continuity_discontinuous += 1,
            None => {}
        }
    }

    /// Bumps the frames-analyzed counter.
    pub fn note_frame_analyzed(&mut self) {
        self.frames_analyzed += 1;
    }

    /// The previous frame's description, the continuity baseline.
    pub fn previous_description(&self) -> Option<&str> {
        self.previous_frame_description.as_deref()
    }

    /// Stashes this frame's description as the next continuity baseline.
    pub fn set_previous_description(&mut self, description: String) {
        self.previous_frame_description = Some(description);
    }

    /// Records `clientInfo` details.
    pub fn record_client_info(&mut self, platform: &str, display_surface: Option<&str>) {
        self.client_platform = Some(platform.to_owned());
        if let Some(surface) = display_surface {
            self.display_surface = Some(surface.to_owned());
        }
    }

    /// Total frames analyzed so far.
    pub fn frames_analyzed(&self) -> u32 {
        self.frames_analyzed
    }

    /// Materializes the signals and scores them.
    ///
    /// `audit` is the per-session challenge audit list; the latest entry
    /// feeds the challenge signal.
    pub fn finalize(&self, audit: &[ChallengeOutcome], now_ms: u64) -> TrustReport {
        let mut flags = Vec::new();
        let mut score = 0.0;

        let url = self.url_signal();
        if url.verified_frames + url.unverified_frames == 0 {
            // nothing asserted a host; neutral
            score += weights::URL;
        } else {
            score += weights::URL * url.ratio;
            if url.unverified_frames > 0 {
                flags.push("url_not_verified".to_owned());
            }
        }

        let challenge = challenge_signal(audit);
        match challenge.outcome {
            ChallengeOutcomeKind::Passed => score += weights::CHALLENGE_RESOLVED,
            ChallengeOutcomeKind::Failed => flags.push("challenge_failed".to_owned()),
            ChallengeOutcomeKind::None => score += weights::CHALLENGE_NONE,
        }

        let session_duration_ms = now_ms.saturating_sub(self.session_started_at_ms);
        if session_duration_ms < MIN_SESSION_DURATION_MS {
            score += weights::DURATION_FAST;
            flags.push("session_too_fast".to_owned());
        } else if session_duration_ms > MAX_SESSION_DURATION_MS {
            score += weights::DURATION_SLOW;
            flags.push("session_too_slow".to_owned());
        } else {
            score += weights::DURATION_FULL;
        }

        if self.frames_analyzed >= 4 {
            score += weights::FRAMES_FULL;
        } else if self.frames_analyzed >= 2 {
            score += weights::FRAMES_LOW;
            flags.push("low_frame_count".to_owned());
        } else {
            flags.push("very_low_frame_count".to_owned());
        }

        match self.display_surface.as_deref() {
            Some("monitor") => score += weights::SURFACE_FULL,
            Some(surface) if !surface.is_empty() => {
                score += weights::SURFACE_PARTIAL;
                flags.push("display_surface_not_monitor".to_owned());
            }
            // mobile clients report no display surface; neutral
            _ => score += weights::SURFACE_FULL,
        }

        let temporal = self.temporal_signal();
        let mut temporal_score = weights::TEMPORAL_FULL;
        if let Some(temporal) = &temporal {
            if self.frame_timestamps.len() >= 4
                && temporal.coefficient_of_variation < 0.05
            {
                temporal_score -= weights::TEMPORAL_UNIFORM_PENALTY;
                flags.push("timing_too_uniform".to_owned());
            }
            if temporal.total_intervals > 0
                && f64::from(temporal.fast_intervals) / f64::from(temporal.total_intervals) > 0.3
            {
                temporal_score -= weights::TEMPORAL_FAST_PENALTY;
                flags.push("timing_suspiciously_fast".to_owned());
            }
        }
        score += temporal_score.max(0.0);

        let frame_similarity = self.similarity_signal();
        let mut similarity_score = weights::SIMILARITY_FULL;
        if let Some(similarity) = &frame_similarity {
            let transitions = f64::from(similarity.total_transitions);
            if f64::from(similarity.duplicate_pairs) / transitions > 0.4 {
                similarity_score -= weights::SIMILARITY_REPLAY_PENALTY;
                flags.push("frame_replay_suspected".to_owned());
            }
            if similarity.unique_ratio < 0.3 {
                similarity_score -= weights::SIMILARITY_LOOP_PENALTY;
                flags.push("frame_looping_suspected".to_owned());
            }
            if f64::from(similarity.abrupt_changes) / transitions > 0.5 {
                similarity_score -= weights::SIMILARITY_SPLICE_PENALTY;
                flags.push("frame_splicing_suspected".to_owned());
            }
        }
        score += similarity_score.max(0.0);

        let visual_continuity = self.continuity_signal();
        if let Some(continuity) = &visual_continuity {
            let total = continuity.consistent_frames + continuity.discontinuous_frames;
            let ratio = f64::from(continuity.consistent_frames) / f64::from(total);
            if ratio >= 0.8 {
                score += weights::CONTINUITY_FULL;
            } else if ratio >= 0.5 {
                score += weights::CONTINUITY_PARTIAL;
                flags.push("visual_continuity_partial".to_owned());
            } else {
                flags.push("visual_continuity_poor".to_owned());
            }
        } else {
            // no AI continuity verdicts recorded; neutral
            score += weights::CONTINUITY_FULL;
        }

        TrustReport {
            score: round2(score.clamp(0.0, 1.0)),
            signals: TrustSignals {
                url,
                challenge,
                session_duration_ms,
                frames_analyzed: self.frames_analyzed,
                display_surface: self.display_surface.clone(),
                temporal,
                frame_similarity,
                visual_continuity,
            },
            flags,
        }
    }

    fn url_signal(&self) -> UrlSignal {
        let total = self.url_verified_frames + self.url_unverified_frames;
        UrlSignal {
            verified: self.url_verified_frames > 0 && self.url_unverified_frames == 0,
            verified_frames: self.url_verified_frames,
            unverified_frames: self.url_unverified_frames,
            ratio: if total == 0 {
                0.0
            } else {
                f64::from(self.url_verified_frames) / f64::from(total)
            },
        }
    }

    fn temporal_signal(&self) -> Option<TemporalSignal> {
        if self.frame_timestamps.len() < 3 {
            return None;
        }
        let timestamps: Vec<u64> = self.frame_timestamps.iter().copied().collect();
        let intervals: Vec<u64> = timestamps
            .windows(2)
            .map(|pair| pair[1].saturating_sub(pair[0]))
            .collect();
        let mean = intervals.iter().map(|&i| i as f64).sum::<f64>() / intervals.len() as f64;
        let variance = intervals
            .iter()
            .map(|&i| {
                let delta = i as f64 - mean;
                delta * delta
            })
            .sum::<f64>()
            / intervals.len() as f64;
        let std_dev = variance.sqrt();
        let fast_intervals = intervals
            .iter()
            .enumerate()
            .filter(|&(idx, &interval)| {
                interval < FAST_INTERVAL_MS && self.hash_changed_at(idx)
            })
            .count() as u32;
        Some(TemporalSignal {
            mean_interval_ms: mean,
            std_dev_ms: std_dev,
            coefficient_of_variation: if mean > 0.0 { std_dev / mean } else { 0.0 },
            fast_intervals,
            total_intervals: intervals.len() as u32,
        })
    }

    /// Whether the hash ring shows a content change across transition `idx`.
    /// Without hashes on both sides nothing can be asserted.
    fn hash_changed_at(&self, idx: usize) -> bool {
        match (self.frame_hashes.get(idx), self.frame_hashes.get(idx + 1)) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }

    fn similarity_signal(&self) -> Option<SimilaritySignal> {
        if self.frame_hashes.len() < 3 {
            return None;
        }
        let hashes: Vec<&String> = self.frame_hashes.iter().collect();
        let total_transitions = (hashes.len() - 1) as u32;
        let duplicate_pairs = hashes.windows(2).filter(|pair| pair[0] == pair[1]).count() as u32;
        let abrupt_changes = hashes
            .windows(3)
            .filter(|w| w[0] != w[1] && w[1] != w[2] && w[0] != w[2])
            .count() as u32;
        let unique = hashes.iter().collect::<HashSet<_>>().len();
        Some(SimilaritySignal {
            duplicate_pairs,
            abrupt_changes,
            total_transitions,
            unique_ratio: unique as f64 / f64::from(total_transitions),
        })
    }

    fn continuity_signal(&self) -> Option<ContinuitySignal> {
        if self.continuity_consistent + self.continuity_discontinuous == 0 {
            return None;
        }
        Some(ContinuitySignal {
            consistent_frames: self.continuity_consistent,
            discontinuous_frames: self.continuity_discontinuous,
        })
    }
}

fn challenge_signal(audit: &[ChallengeOutcome]) -> ChallengeSignal {
    match audit.last() {
        Some(outcome) => ChallengeSignal {
            outcome: if outcome.passed {
                ChallengeOutcomeKind::Passed
            } else {
                ChallengeOutcomeKind::Failed
            },
            response_time_ms: Some(outcome.response_time_ms),
        },
        None => ChallengeSignal {
            outcome: ChallengeOutcomeKind::None,
            response_time_ms: None,
        },
    }
}

fn push_capped<T>(ring: &mut VecDeque<T>, value: T) {
    if ring.len() == FRAME_RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(value);
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(passed: bool) -> ChallengeOutcome {
        ChallengeOutcome {
            challenge_id: "c".to_owned(),
            step: 0,
            passed,
            response_time_ms: 2_000,
        }
    }

    /// A session shaped like a legitimate one: verified URLs, organic
    /// timing, mixed hashes, continuous frames.
    fn organic_accumulator() -> TrustAccumulator {
        let mut acc = TrustAccumulator::new(0);
        let mut now = 0;
        let hashes = ["h0", "h0", "h1", "h2"];
        for (idx, gap) in [3_000, 5_000, 4_200, 3_700].iter().enumerate() {
            now += gap;
            acc.record_frame_timestamp(now);
            acc.record_frame_hash(hashes[idx].to_owned());
            acc.record_url_verdict(Some(true), true);
            acc.note_frame_analyzed();
            if idx > 0 {
                acc.record_continuity(Some(true));
            }
        }
        acc
    }

    #[test]
    fn organic_session_scores_high() {
        let acc = organic_accumulator();
        let report = acc.finalize(&[], 60_000);
        assert!(report.score >= 0.85, "score was {}", report.score);
        assert!(report.flags.is_empty(), "flags: {:?}", report.flags);
        assert!(report.signals.url.verified);
        assert_eq!(report.signals.frames_analyzed, 4);
    }

    #[test]
    fn passed_challenge_outscores_no_challenge() {
        let acc = organic_accumulator();
        let with_pass = acc.finalize(&[outcome(true)], 60_000);
        let without = acc.finalize(&[], 60_000);
        assert!(with_pass.score > without.score);
        assert_eq!(
            with_pass.signals.challenge.outcome,
            ChallengeOutcomeKind::Passed
        );
        assert_eq!(with_pass.signals.challenge.response_time_ms, Some(2_000));
    }

    #[test]
    fn failed_challenge_flags_and_zeroes_challenge_weight() {
        let acc = organic_accumulator();
        let report = acc.finalize(&[outcome(false)], 60_000);
        assert!(report.flags.iter().any(|f| f == "challenge_failed"));
        assert_eq!(
            report.signals.challenge.outcome,
            ChallengeOutcomeKind::Failed
        );
    }

    #[test]
    fn url_mismatch_breaks_verified_and_scales_ratio() {
        let mut acc = organic_accumulator();
        acc.record_url_verdict(Some(false), true);
        let report = acc.finalize(&[], 60_000);
        assert!(!report.signals.url.verified);
        assert_eq!(report.signals.url.ratio, 0.8);
        assert!(report.flags.iter().any(|f| f == "url_not_verified"));
    }

    #[test]
    fn url_counters_ignore_steps_without_expected_domain() {
        let mut acc = TrustAccumulator::new(0);
        acc.record_url_verdict(Some(false), false);
        acc.record_url_verdict(Some(true), false);
        let report = acc.finalize(&[], 60_000);
        assert_eq!(report.signals.url.verified_frames, 0);
        assert_eq!(report.signals.url.unverified_frames, 0);
        assert!(!report.flags.iter().any(|f| f == "url_not_verified"));
    }

    #[test]
    fn fast_sessions_are_flagged() {
        let acc = organic_accumulator();
        let report = acc.finalize(&[], 14_999);
        assert!(report.flags.iter().any(|f| f == "session_too_fast"));
        let report = acc.finalize(&[], 15_000);
        assert!(!report.flags.iter().any(|f| f == "session_too_fast"));
    }

    #[test]
    fn slow_sessions_are_flagged() {
        let acc = organic_accumulator();
        let report = acc.finalize(&[], 300_001);
        assert!(report.flags.iter().any(|f| f == "session_too_slow"));
    }

    #[test]
    fn frame_coverage_tiers() {
        let mut acc = TrustAccumulator::new(0);
        acc.note_frame_analyzed();
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "very_low_frame_count"));

        acc.note_frame_analyzed();
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "low_frame_count"));

        acc.note_frame_analyzed();
        acc.note_frame_analyzed();
        let report = acc.finalize(&[], 60_000);
        assert!(!report.flags.iter().any(|f| f.contains("frame_count")));
    }

    #[test]
    fn metronome_timing_is_flagged_uniform() {
        let mut acc = TrustAccumulator::new(0);
        for i in 1..=5u64 {
            acc.record_frame_timestamp(i * 1_000);
            acc.note_frame_analyzed();
        }
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "timing_too_uniform"));
        let temporal = report.signals.temporal.expect("has temporal signal");
        assert_eq!(temporal.total_intervals, 4);
        assert!(temporal.coefficient_of_variation < 0.05);
    }

    #[test]
    fn three_timestamps_do_not_trigger_uniform_flag() {
        let mut acc = TrustAccumulator::new(0);
        for i in 1..=3u64 {
            acc.record_frame_timestamp(i * 1_000);
        }
        let report = acc.finalize(&[], 60_000);
        assert!(report.signals.temporal.is_some());
        assert!(!report.flags.iter().any(|f| f == "timing_too_uniform"));
    }

    #[test]
    fn fast_intervals_need_a_hash_change() {
        let mut acc = TrustAccumulator::new(0);
        // 4 frames 100ms apart, hashes all distinct: every interval is a
        // fast content change
        for i in 0..4u64 {
            acc.record_frame_timestamp(1_000 + i * 100);
            acc.record_frame_hash(format!("h{i}"));
        }
        let report = acc.finalize(&[], 60_000);
        assert!(
            report
                .flags
                .iter()
                .any(|f| f == "timing_suspiciously_fast")
        );

        // same timing but an identical hash everywhere: screen static, the
        // cadence alone is not suspicious
        let mut acc = TrustAccumulator::new(0);
        for i in 0..4u64 {
            acc.record_frame_timestamp(1_000 + i * 100);
            acc.record_frame_hash("same".to_owned());
        }
        let report = acc.finalize(&[], 60_000);
        assert!(
            !report
                .flags
                .iter()
                .any(|f| f == "timing_suspiciously_fast")
        );
    }

    #[test]
    fn replayed_frames_are_flagged() {
        let mut acc = TrustAccumulator::new(0);
        for hash in ["a", "a", "b", "b", "a"] {
            acc.record_frame_hash(hash.to_owned());
        }
        // 2 of 4 transitions are duplicate pairs
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "frame_replay_suspected"));
        let similarity = report
            .signals
            .frame_similarity
            .expect("has similarity signal");
        assert_eq!(similarity.duplicate_pairs, 2);
        assert_eq!(similarity.total_transitions, 4);
    }

    #[test]
    fn looping_hashes_are_flagged() {
        let mut acc = TrustAccumulator::new(0);
        for _ in 0..10 {
            acc.record_frame_hash("a".to_owned());
            acc.record_frame_hash("b".to_owned());
        }
        // 2 unique hashes over 19 transitions
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "frame_looping_suspected"));
    }

    #[test]
    fn spliced_hash_runs_are_flagged() {
        let mut acc = TrustAccumulator::new(0);
        for hash in ["a", "b", "c", "d", "e"] {
            acc.record_frame_hash(hash.to_owned());
        }
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "frame_splicing_suspected"));
        let similarity = report
            .signals
            .frame_similarity
            .expect("has similarity signal");
        assert_eq!(similarity.abrupt_changes, 3);
    }

    #[test]
    fn discontinuous_frames_degrade_continuity() {
        let mut acc = TrustAccumulator::new(0);
        acc.record_continuity(Some(true));
        acc.record_continuity(Some(false));
        let report = acc.finalize(&[], 60_000);
        assert!(
            report
                .flags
                .iter()
                .any(|f| f == "visual_continuity_partial")
        );

        acc.record_continuity(Some(false));
        let report = acc.finalize(&[], 60_000);
        assert!(report.flags.iter().any(|f| f == "visual_continuity_poor"));
    }

    #[test]
    fn rings_are_capped_at_capacity() {
        let mut acc = TrustAccumulator::new(0);
        for i in 0..250u64 {
            acc.record_frame_timestamp(i);
            acc.record_frame_hash(format!("h{i}"));
        }
        assert_eq!(acc.frame_timestamps.len(), FRAME_RING_CAPACITY);
        assert_eq!(acc.frame_hashes.len(), FRAME_RING_CAPACITY);
        // oldest entries were evicted
        assert_eq!(acc.frame_timestamps.front().copied(), Some(150));
        assert_eq!(acc.frame_hashes.front().map(String::as_str), Some("h150"));
    }

    #[test]
    fn score_is_rounded_to_two_decimals() {
        let report = organic_accumulator().finalize(&[], 60_000);
        let rescaled = report.score * 100.0;
        assert!((rescaled - rescaled.round()).abs() < 1e-9);
    }

    #[test]
    fn display_surface_tiers() {
        let mut acc = organic_accumulator();
        acc.record_client_info("web", Some("monitor"));
        let monitor = acc.finalize(&[], 60_000);
        assert!(monitor.flags.is_empty());

        acc.record_client_info("web", Some("window"));
        let window = acc.finalize(&[], 60_000);
        assert!(
            window
                .flags
                .iter()
                .any(|f| f == "display_surface_not_monitor")
        );
        assert!(window.score < monitor.score);
    }
}
