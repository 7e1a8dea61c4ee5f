//! Anti-forgery interaction challenges.
//!
//! A challenge injects a randomly chosen instruction ("click Notifications")
//! whose fulfillment must be observed in a subsequent frame within a
//! timeout. Challenges are silent-flagging: failing one lowers the trust
//! score but never blocks the user.
//!
//! At most one challenge is active per session at any instant, and at most
//! one challenge is ever issued per (session, step). Expiry is inferred
//! opportunistically at frame time; no wall-clock timer is spawned.

use rand::Rng;
use serde::{Deserialize, Serialize};
use shareguide_types::template::TemplateStep;
use uuid::Uuid;

/// The challenge currently awaiting verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveChallenge {
    /// Opaque challenge id sent to the client.
    pub id: String,
    /// The instruction relayed to the user.
    pub instruction: String,
    /// The criterion subsequent frames are analyzed against.
    pub success_criteria: String,
    /// When the challenge was issued.
    pub issued_at_ms: u64,
    /// Time budget for fulfillment.
    pub timeout_ms: u64,
}

impl ActiveChallenge {
    /// Whether the challenge has exceeded its timeout (strictly greater).
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.issued_at_ms) > self.timeout_ms
    }

    /// Milliseconds elapsed since issuance.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.issued_at_ms)
    }

    /// Consumes the challenge into an audit entry.
    pub fn into_outcome(self, step: usize, passed: bool, now_ms: u64) -> ChallengeOutcome {
        let response_time_ms = self.elapsed_ms(now_ms);
        ChallengeOutcome {
            challenge_id: self.id,
            step,
            passed,
            response_time_ms,
        }
    }
}

/// One entry of the per-session challenge audit list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOutcome {
    /// The challenge id.
    pub challenge_id: String,
    /// The step the challenge was issued on.
    pub step: usize,
    /// Whether the challenge was fulfilled within its timeout.
    pub passed: bool,
    /// Milliseconds between issuance and resolution.
    pub response_time_ms: u64,
}

/// Rolls the challenge coin for a step that just met its success criterion.
///
/// Returns a fresh [`ActiveChallenge`] when (a) no challenge was issued for
/// this step yet, (b) none is currently active, (c) the step defines any
/// challenges, and (d) a uniform sample lands below `probability`. The
/// challenge itself is selected uniformly at random.
pub fn maybe_issue<R: Rng>(
    step: &TemplateStep,
    already_issued: bool,
    has_active: bool,
    probability: f64,
    default_timeout_ms: u64,
    now_ms: u64,
    rng: &mut R,
) -> Option<ActiveChallenge> {
    if already_issued || has_active {
        return None;
    }
    let specs = step.challenges.as_deref().filter(|specs| !specs.is_empty())?;
    if rng.r#gen::<f64>() >= probability {
        return None;
    }
    let spec = &specs[rng.gen_range(0..specs.len())];
    Some(ActiveChallenge {
        id: Uuid::new_v4().to_string(),
        instruction: spec.instruction.clone(),
        success_criteria: spec.success_criteria.clone(),
        issued_at_ms: now_ms,
        timeout_ms: spec.timeout_ms.unwrap_or(default_timeout_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand_chacha::ChaCha12Rng;
    use shareguide_types::template::ChallengeSpec;

    fn step_with_challenges(specs: Vec<ChallengeSpec>) -> TemplateStep {
        TemplateStep {
            instruction: "open notifications".to_owned(),
            success_criteria: "notifications are visible".to_owned(),
            link: None,
            extraction_fields: None,
            require_link_click: false,
            expected_domain: None,
            challenges: Some(specs),
            hints: None,
        }
    }

    fn spec(timeout_ms: Option<u64>) -> ChallengeSpec {
        ChallengeSpec {
            instruction: "click the bell icon".to_owned(),
            success_criteria: "the notification panel is open".to_owned(),
            timeout_ms,
        }
    }

    #[test]
    fn expiry_is_strictly_greater_than_timeout() {
        let challenge = ActiveChallenge {
            id: "c".to_owned(),
            instruction: String::new(),
            success_criteria: String::new(),
            issued_at_ms: 1_000,
            timeout_ms: 15_000,
        };
        assert!(!challenge.expired(16_000));
        assert!(challenge.expired(16_001));
    }

    #[test]
    fn probability_one_always_issues_and_zero_never_does() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let step = step_with_challenges(vec![spec(None)]);
        for _ in 0..20 {
            assert!(maybe_issue(&step, false, false, 1.0, 15_000, 0, &mut rng).is_some());
            assert!(maybe_issue(&step, false, false, 0.0, 15_000, 0, &mut rng).is_none());
        }
    }

    #[test]
    fn one_shot_per_step_and_single_active() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let step = step_with_challenges(vec![spec(None)]);
        assert!(maybe_issue(&step, true, false, 1.0, 15_000, 0, &mut rng).is_none());
        assert!(maybe_issue(&step, false, true, 1.0, 15_000, 0, &mut rng).is_none());
    }

    #[test]
    fn steps_without_challenges_never_issue() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let step = step_with_challenges(Vec::new());
        assert!(maybe_issue(&step, false, false, 1.0, 15_000, 0, &mut rng).is_none());
    }

    #[test]
    fn timeout_defaults_when_spec_has_none() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let step = step_with_challenges(vec![spec(None)]);
        let challenge =
            maybe_issue(&step, false, false, 1.0, 15_000, 42, &mut rng).expect("issues");
        assert_eq!(challenge.timeout_ms, 15_000);
        assert_eq!(challenge.issued_at_ms, 42);

        let step = step_with_challenges(vec![spec(Some(5_000))]);
        let challenge =
            maybe_issue(&step, false, false, 1.0, 15_000, 42, &mut rng).expect("issues");
        assert_eq!(challenge.timeout_ms, 5_000);
    }

    #[test]
    fn outcome_records_elapsed_time() {
        let challenge = ActiveChallenge {
            id: "c-1".to_owned(),
            instruction: String::new(),
            success_criteria: String::new(),
            issued_at_ms: 1_000,
            timeout_ms: 15_000,
        };
        let outcome = challenge.into_outcome(2, false, 17_000);
        assert_eq!(outcome.challenge_id, "c-1");
        assert_eq!(outcome.step, 2);
        assert!(!outcome.passed);
        assert_eq!(outcome.response_time_ms, 16_000);
    }
}
