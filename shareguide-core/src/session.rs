//! The per-session state record.
//!
//! One [`SessionState`] exists per live token. It is owned exclusively by
//! the connection handler for the duration of a message and written back to
//! the session store after every handled message. On reconnect the state is
//! rebuilt from scratch except for the committed extracted data, which is
//! lifted from the session row's metadata; vote tallies and TTS memory are
//! deliberately lost.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shareguide_types::analysis::ExtractedField;
use shareguide_types::template::Template;
use uuid::Uuid;

use crate::challenge::{ActiveChallenge, ChallengeOutcome};
use crate::consensus::ExtractionConsensus;
use crate::trust::TrustAccumulator;
use crate::tts_gate::TtsGate;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Idle between frames.
    Waiting,
    /// A frame is currently with the vision model.
    Analyzing,
    /// All steps are done; no further frame mutations are accepted.
    Completed,
}

/// The state machine record for one live session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    /// Server-side session id (from the session row).
    pub session_id: Uuid,
    /// The template this session runs.
    pub template_id: Uuid,
    /// Platform tag derived from the template.
    pub platform: String,
    /// Current step index in `[0, total_steps]`; equals `total_steps` iff
    /// completed.
    pub current_step: usize,
    /// Total steps in the template.
    pub total_steps: usize,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Consecutive matching frames on the current step.
    pub consecutive_successes: u32,
    /// Steps whose link click was confirmed. Monotonic per step.
    pub link_clicked: HashSet<usize>,
    /// Timestamp of the most recent link click.
    pub link_clicked_at_ms: Option<u64>,
    /// Extraction votes and committed values.
    pub extraction: ExtractionConsensus,
    /// Spoken-guidance memory.
    pub tts: TtsGate,
    /// The challenge currently awaiting verification, if any.
    pub active_challenge: Option<ActiveChallenge>,
    /// Whether a challenge was already issued for the current step.
    pub challenge_issued: bool,
    /// Audit list of past challenge outcomes.
    pub challenge_audit: Vec<ChallengeOutcome>,
    /// Per-frame trust signals.
    pub trust: TrustAccumulator,
    /// When the last frame was handed to the vision model (debouncing).
    pub last_analysis_at_ms: Option<u64>,
}

impl SessionState {
    /// Hydrates a fresh state from the persisted session row.
    ///
    /// `persisted_step` is clamped into `[0, N-1]`; `recovered_extraction`
    /// is the committed list lifted from the row's metadata, for
    /// reconnection resilience. A row already marked completed hydrates
    /// terminal with `current_step == total_steps`.
    pub fn hydrate(
        session_id: Uuid,
        template: &Template,
        persisted_step: usize,
        already_completed: bool,
        recovered_extraction: Vec<ExtractedField>,
        now_ms: u64,
    ) -> Self {
        let total_steps = template.steps.len();
        let current_step = if already_completed {
            total_steps
        } else {
            persisted_step.min(total_steps.saturating_sub(1))
        };
        Self {
            session_id,
            template_id: template.id,
            platform: template.platform.clone(),
            current_step,
            total_steps,
            status: if already_completed {
                SessionStatus::Completed
            } else {
                SessionStatus::Waiting
            },
            consecutive_successes: 0,
            link_clicked: HashSet::new(),
            link_clicked_at_ms: None,
            extraction: ExtractionConsensus::rehydrate(recovered_extraction),
            tts: TtsGate::default(),
            active_challenge: None,
            challenge_issued: false,
            challenge_audit: Vec::new(),
            trust: TrustAccumulator::new(now_ms),
            last_analysis_at_ms: None,
        }
    }

    /// Returns `true` iff the session has completed all steps.
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Whether frames for the current step are gated behind a link click.
    pub fn link_gate_open(&self, require_link_click: bool) -> bool {
        !require_link_click || self.link_clicked.contains(&self.current_step)
    }

    /// Records a link click for `step`. The clicked flag is monotonic but
    /// the spoken-action memory resets on every click.
    pub fn record_link_click(&mut self, step: usize, now_ms: u64) {
        self.link_clicked.insert(step);
        self.link_clicked_at_ms = Some(now_ms);
        self.tts.clear_spoken_action();
    }

    /// Advances to the next step, resetting the per-step fields.
    ///
    /// Returns the new step index. Callers must persist it and emit the
    /// transition messages.
    pub fn advance_step(&mut self) -> usize {
        self.current_step += 1;
        self.consecutive_successes = 0;
        self.challenge_issued = false;
        self.tts.clear_spoken_action();
        self.current_step
    }

    /// Marks the session terminal.
    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
    }

    /// Whether a new frame should be dropped by the debouncer.
    pub fn debounced(&self, now_ms: u64, debounce_ms: u64) -> bool {
        self.last_analysis_at_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shareguide_types::template::TemplateStep;

    fn template(steps: usize) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "t".to_owned(),
            platform: "instagram".to_owned(),
            steps: (0..steps)
                .map(|i| TemplateStep {
                    instruction: format!("step {i}"),
                    success_criteria: "done".to_owned(),
                    link: None,
                    extraction_fields: None,
                    require_link_click: false,
                    expected_domain: None,
                    challenges: None,
                    hints: None,
                })
                .collect(),
        }
    }

    #[test]
    fn persisted_step_is_clamped() {
        let template = template(3);
        let state = SessionState::hydrate(Uuid::new_v4(), &template, 7, false, Vec::new(), 0);
        assert_eq!(state.current_step, 2);
        assert_eq!(state.status, SessionStatus::Waiting);
    }

    #[test]
    fn completed_rows_hydrate_terminal() {
        let template = template(3);
        let state = SessionState::hydrate(Uuid::new_v4(), &template, 3, true, Vec::new(), 0);
        assert!(state.is_completed());
        assert_eq!(state.current_step, 3);
    }

    #[test]
    fn advance_resets_per_step_state() {
        let template = template(3);
        let mut state = SessionState::hydrate(Uuid::new_v4(), &template, 0, false, Vec::new(), 0);
        state.consecutive_successes = 1;
        state.challenge_issued = true;
        assert_eq!(state.advance_step(), 1);
        assert_eq!(state.consecutive_successes, 0);
        assert!(!state.challenge_issued);
    }

    #[test]
    fn link_clicks_are_monotonic_per_step() {
        let template = template(2);
        let mut state = SessionState::hydrate(Uuid::new_v4(), &template, 0, false, Vec::new(), 0);
        assert!(!state.link_gate_open(true));
        assert!(state.link_gate_open(false));
        state.record_link_click(0, 1_000);
        state.record_link_click(0, 2_000);
        assert!(state.link_gate_open(true));
        assert_eq!(state.link_clicked_at_ms, Some(2_000));
        assert_eq!(state.link_clicked.len(), 1);
    }

    #[test]
    fn debounce_comparator_is_strictly_less() {
        let template = template(1);
        let mut state = SessionState::hydrate(Uuid::new_v4(), &template, 0, false, Vec::new(), 0);
        assert!(!state.debounced(100, 400));
        state.last_analysis_at_ms = Some(1_000);
        assert!(state.debounced(1_399, 400));
        assert!(!state.debounced(1_400, 400));
    }

    #[test]
    fn state_round_trips_through_json() {
        let template = template(2);
        let state = SessionState::hydrate(Uuid::new_v4(), &template, 1, false, Vec::new(), 5_000);
        let json = serde_json::to_string(&state).expect("serializes");
        let back: SessionState = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.current_step, 1);
        assert_eq!(back.status, SessionStatus::Waiting);
    }
}
