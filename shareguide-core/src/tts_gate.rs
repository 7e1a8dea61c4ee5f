//! The TTS utterance gate.
//!
//! Candidate guidance coming out of failed frame analyses is chatty: the
//! vision model happily suggests "scroll down" on every frame. The gate
//! suppresses that chatter with three policies:
//!
//! * **quiet period** – after a link click the destination page is still
//!   loading, so nothing is spoken for a short window;
//! * **stability** – a candidate must be suggested by two consecutive
//!   frames before the user hears it;
//! * **stuck timeout** – when nothing has been spoken for a while, the
//!   previously spoken guidance (not the current candidate) is repeated, so
//!   the user is not gaslit about a screen that has not changed.
//!
//! Scripted emissions (connection open, step transitions, completion,
//! challenge issuance) bypass the gate entirely.

use serde::{Deserialize, Serialize};

use crate::limits::Tuning;

/// The gate's verdict for one candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Utterance {
    /// Speak this text now.
    Speak(String),
    /// Stay silent.
    Silent,
}

/// Spoken-guidance memory for one session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TtsGate {
    /// The last guidance actually spoken through the gate.
    last_spoken: Option<String>,
    /// When any utterance (gated or scripted) last went out.
    last_instruction_at_ms: Option<u64>,
    /// The candidate waiting for a second agreeing frame.
    pending: Option<String>,
}

impl TtsGate {
    /// Decides whether `candidate` should be spoken.
    ///
    /// `link_clicked_at_ms` is the timestamp of the most recent link click,
    /// if any; all times share one clock.
    pub fn decide(
        &mut self,
        candidate: &str,
        link_clicked_at_ms: Option<u64>,
        now_ms: u64,
        tuning: &Tuning,
    ) -> Utterance {
        if let Some(clicked_at) = link_clicked_at_ms
            && now_ms.saturating_sub(clicked_at) < tuning.tts_quiet_period_ms
        {
            self.pending = Some(candidate.to_owned());
            return Utterance::Silent;
        }

        let stable = self.pending.as_deref() == Some(candidate);
        let new = self.last_spoken.as_deref() != Some(candidate);
        if stable && new {
            self.last_spoken = Some(candidate.to_owned());
            self.last_instruction_at_ms = Some(now_ms);
            self.pending = None;
            return Utterance::Speak(candidate.to_owned());
        }

        if let (Some(last_spoken), Some(last_at)) =
            (self.last_spoken.as_ref(), self.last_instruction_at_ms)
            && now_ms.saturating_sub(last_at) >= tuning.tts_stuck_timeout_ms
        {
            let repeat = last_spoken.clone();
            self.last_instruction_at_ms = Some(now_ms);
            return Utterance::Speak(repeat);
        }

        self.pending = Some(candidate.to_owned());
        Utterance::Silent
    }

    /// Notes a scripted emission so the stuck timer restarts from it.
    pub fn note_scripted(&mut self, now_ms: u64) {
        self.last_instruction_at_ms = Some(now_ms);
    }

    /// Clears the spoken-action memory (on link clicks and step advances).
    pub fn clear_spoken_action(&mut self) {
        self.last_spoken = None;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        Tuning::default()
    }

    #[test]
    fn first_suggestion_is_buffered_not_spoken() {
        let mut gate = TtsGate::default();
        assert_eq!(
            gate.decide("scroll down", None, 1_000, &tuning()),
            Utterance::Silent
        );
    }

    #[test]
    fn second_agreeing_suggestion_is_spoken() {
        let mut gate = TtsGate::default();
        gate.decide("scroll down", None, 1_000, &tuning());
        assert_eq!(
            gate.decide("scroll down", None, 2_000, &tuning()),
            Utterance::Speak("scroll down".to_owned())
        );
        // and not repeated while it stays the latest spoken action
        gate.decide("scroll down", None, 3_000, &tuning());
        assert_eq!(
            gate.decide("scroll down", None, 4_000, &tuning()),
            Utterance::Silent
        );
    }

    #[test]
    fn flickering_suggestions_stay_silent() {
        let mut gate = TtsGate::default();
        assert_eq!(
            gate.decide("scroll down", None, 1_000, &tuning()),
            Utterance::Silent
        );
        assert_eq!(
            gate.decide("tap the story", None, 2_000, &tuning()),
            Utterance::Silent
        );
        assert_eq!(
            gate.decide("scroll down", None, 3_000, &tuning()),
            Utterance::Silent
        );
    }

    #[test]
    fn quiet_period_after_link_click() {
        let mut gate = TtsGate::default();
        gate.decide("scroll down", None, 1_000, &tuning());
        // stable candidate, but the link was clicked 3s ago
        assert_eq!(
            gate.decide("scroll down", Some(10_000), 13_000, &tuning()),
            Utterance::Silent
        );
        // quiet period over (4s boundary is exclusive)
        assert_eq!(
            gate.decide("scroll down", Some(10_000), 14_000, &tuning()),
            Utterance::Speak("scroll down".to_owned())
        );
    }

    #[test]
    fn stuck_timeout_repeats_last_spoken_not_candidate() {
        let mut gate = TtsGate::default();
        gate.decide("scroll down", None, 1_000, &tuning());
        gate.decide("scroll down", None, 2_000, &tuning());
        // 15s later a different (unstable) candidate arrives
        assert_eq!(
            gate.decide("tap the story", None, 17_000, &tuning()),
            Utterance::Speak("scroll down".to_owned())
        );
    }

    #[test]
    fn stuck_timeout_counts_from_scripted_speech() {
        let mut gate = TtsGate::default();
        gate.decide("scroll down", None, 1_000, &tuning());
        gate.decide("scroll down", None, 2_000, &tuning());
        gate.note_scripted(10_000);
        // only 9s since the scripted utterance: not stuck yet
        assert_eq!(
            gate.decide("tap the story", None, 19_000, &tuning()),
            Utterance::Silent
        );
        assert_eq!(
            gate.decide("something else", None, 25_000, &tuning()),
            Utterance::Speak("scroll down".to_owned())
        );
    }

    #[test]
    fn clearing_spoken_action_allows_same_guidance_again() {
        let mut gate = TtsGate::default();
        gate.decide("scroll down", None, 1_000, &tuning());
        gate.decide("scroll down", None, 2_000, &tuning());
        gate.clear_spoken_action();
        gate.decide("scroll down", None, 3_000, &tuning());
        assert_eq!(
            gate.decide("scroll down", None, 4_000, &tuning()),
            Utterance::Speak("scroll down".to_owned())
        );
    }
}
