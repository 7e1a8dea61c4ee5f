//! The per-connection session engine.
//!
//! One [`SessionEngine`] exists per live WebSocket connection and owns that
//! token's [`SessionState`] exclusively. Message handling is sequential
//! within a connection; the connection loop drains the engine's outbox
//! after every handled message and writes the mutated state back to the
//! session store. No lock is held across any suspension point.

pub(crate) mod frames;

use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use shareguide_core::challenge;
use shareguide_core::limits::Tuning;
use shareguide_core::session::SessionState;
use shareguide_core::tts_gate::Utterance;
use shareguide_types::protocol::{ClientMessage, ServerMessage};
use shareguide_types::template::Template;
use shareguide_types::SessionToken;
use tracing::instrument;

use crate::api::errors::Error;
use crate::metrics::{
    METRICS_ID_CHALLENGES_ISSUED, METRICS_ID_SESSIONS_COMPLETED, METRICS_ID_TTS_DURATION,
};
use crate::services::clock::ClockService;
use crate::services::repository::{SessionRepositoryService, session_status};
use crate::services::session_store::SessionStoreService;
use crate::services::tts::TtsService;
use crate::services::vision::VisionService;
use crate::services::webhook::{CompletionEvent, WebhookNotifier};

/// Client-facing completion copy.
const COMPLETION_MESSAGE: &str = "All steps completed successfully.";
/// Spoken completion line.
const COMPLETION_SPEECH: &str = "You're all set! Verification complete.";

/// Shared dependencies handed to every engine instance.
#[derive(Clone)]
pub(crate) struct EngineDeps {
    pub(crate) repository: SessionRepositoryService,
    pub(crate) store: SessionStoreService,
    pub(crate) vision: VisionService,
    pub(crate) tts: TtsService,
    pub(crate) webhook: Option<Arc<WebhookNotifier>>,
    pub(crate) clock: ClockService,
    pub(crate) tuning: Tuning,
    pub(crate) rng_seed: Option<u64>,
}

/// The state machine driving one live session.
pub(crate) struct SessionEngine {
    token: SessionToken,
    template: Template,
    state: SessionState,
    deps: EngineDeps,
    rng: StdRng,
    outbox: Vec<ServerMessage>,
}

impl SessionEngine {
    /// Loads the session row and template, hydrates the state, commits it
    /// to the session store, and queues the `connected` greeting.
    #[instrument(level = "debug", skip_all, fields(session_id = tracing::field::Empty))]
    pub(crate) async fn open(deps: EngineDeps, token: SessionToken) -> Result<Self, Error> {
        let row = deps
            .repository
            .find_session(token.as_str())
            .await?
            .ok_or(Error::SessionNotFound)?;
        tracing::Span::current().record("session_id", row.id.to_string());
        let now_ms = deps.clock.now_ms();
        if row.is_expired(now_ms) {
            return Err(Error::SessionExpired);
        }
        let template = deps
            .repository
            .find_template(row.template_id)
            .await?
            .ok_or(Error::TemplateNotFound)?;
        if template.steps.is_empty() {
            tracing::warn!("template {} has no steps", template.id);
            return Err(Error::TemplateNotFound);
        }

        let already_completed = row.status == session_status::COMPLETED;
        let state = SessionState::hydrate(
            row.id,
            &template,
            row.current_step.max(0) as usize,
            already_completed,
            row.recovered_extraction(),
            now_ms,
        );
        let rng = match deps.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut engine = Self {
            token,
            template,
            state,
            deps,
            rng,
            outbox: Vec::new(),
        };
        engine.persist_to_store().await;

        let instruction = engine.current_instruction().to_owned();
        engine.push(ServerMessage::Connected {
            session_id: engine.state.session_id,
            current_step: engine.state.current_step,
            total_steps: engine.state.total_steps,
            instruction: instruction.clone(),
        });
        if engine.state.current_step == 0 && !engine.state.is_completed() {
            engine.speak_scripted(&instruction).await;
        }
        Ok(engine)
    }

    /// Handles one validated inbound message. Never terminal: failures are
    /// answered inline through the outbox.
    pub(crate) async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Frame {
                image_data,
                frame_hash,
            } => self.process_frame(&image_data, frame_hash).await,
            ClientMessage::LinkClicked { step } => {
                let now_ms = self.deps.clock.now_ms();
                tracing::info!("link click confirmed for step {step}");
                self.state.record_link_click(step as usize, now_ms);
            }
            ClientMessage::AudioComplete => {
                tracing::trace!("audio playback finished");
            }
            ClientMessage::Ping => self.push(ServerMessage::Pong),
            ClientMessage::RequestHint => self.speak_hint().await,
            ClientMessage::SkipStep => self.skip_step().await,
            ClientMessage::ChallengeAck { challenge_id } => {
                tracing::info!("client acknowledged challenge {challenge_id}");
            }
            ClientMessage::ClientInfo {
                platform,
                display_surface,
                screen_resolution,
                device_pixel_ratio,
                timezone,
            } => {
                tracing::info!(
                    platform = platform.as_str(),
                    ?display_surface,
                    ?screen_resolution,
                    ?device_pixel_ratio,
                    ?timezone,
                    "client info received"
                );
                self.state
                    .trust
                    .record_client_info(platform.as_str(), display_surface.as_deref());
            }
        }
    }

    /// Moves the queued outbound messages to the caller.
    pub(crate) fn drain_outbox(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Writes the current state back to the session store, best-effort.
    pub(crate) async fn persist_to_store(&self) {
        if let Err(err) = self.deps.store.set(self.token.as_str(), &self.state).await {
            tracing::error!("could not persist session state: {err:?}");
        }
    }

    fn push(&mut self, message: ServerMessage) {
        self.outbox.push(message);
    }

    fn current_instruction(&self) -> &str {
        match self.template.steps.get(self.state.current_step) {
            Some(step) => &step.instruction,
            None => COMPLETION_MESSAGE,
        }
    }

    /// The success path after a frame matched with sufficient confidence.
    async fn on_success(&mut self, now_ms: u64) {
        let mut challenge_handled = false;
        if let Some(active) = self.state.active_challenge.take() {
            let expired = active.expired(now_ms);
            let outcome = active.into_outcome(self.state.current_step, !expired, now_ms);
            if expired {
                tracing::info!(
                    "challenge {} timed out after {}ms",
                    outcome.challenge_id,
                    outcome.response_time_ms
                );
            } else {
                tracing::info!(
                    "challenge {} passed in {}ms",
                    outcome.challenge_id,
                    outcome.response_time_ms
                );
            }
            self.state.challenge_audit.push(outcome);
            // silent flagging: the step advances either way
            self.state.consecutive_successes = self.deps.tuning.success_threshold;
            challenge_handled = true;
        } else {
            let step = &self.template.steps[self.state.current_step];
            let missing_required = step
                .required_field_names()
                .any(|name| !self.state.extraction.has_committed(name));
            if missing_required {
                tracing::debug!("matching frame, but required fields are still missing");
                return;
            }
            self.state.consecutive_successes += 1;
        }

        if self.state.consecutive_successes < self.deps.tuning.success_threshold {
            return;
        }

        if !challenge_handled {
            let step = &self.template.steps[self.state.current_step];
            if let Some(challenge) = challenge::maybe_issue(
                step,
                self.state.challenge_issued,
                self.state.active_challenge.is_some(),
                self.deps.tuning.challenge_probability,
                self.deps.tuning.challenge_timeout_ms,
                now_ms,
                &mut self.rng,
            ) {
                ::metrics::counter!(METRICS_ID_CHALLENGES_ISSUED).increment(1);
                tracing::info!("issuing challenge {} on step {}", challenge.id, self.state.current_step);
                self.state.challenge_issued = true;
                self.push(ServerMessage::Challenge {
                    challenge_id: challenge.id.clone(),
                    instruction: challenge.instruction.clone(),
                    timeout_ms: challenge.timeout_ms,
                });
                let instruction = challenge.instruction.clone();
                self.state.active_challenge = Some(challenge);
                self.speak_scripted(&instruction).await;
                // subsequent frames are analyzed against the challenge
                return;
            }
        }

        self.advance(now_ms).await;
    }

    /// The failure path: lazy challenge expiry, then gated guidance.
    async fn on_failure(&mut self, suggested_action: Option<&str>, now_ms: u64) {
        if self
            .state
            .active_challenge
            .as_ref()
            .is_some_and(|active| active.expired(now_ms))
        {
            let active = self.state.active_challenge.take().expect("checked above");
            let outcome = active.into_outcome(self.state.current_step, false, now_ms);
            tracing::info!(
                "challenge {} timed out after {}ms",
                outcome.challenge_id,
                outcome.response_time_ms
            );
            self.state.challenge_audit.push(outcome);
            self.advance(now_ms).await;
            return;
        }

        if let Some(candidate) = suggested_action {
            let decision = self.state.tts.decide(
                candidate,
                self.state.link_clicked_at_ms,
                now_ms,
                &self.deps.tuning,
            );
            if let Utterance::Speak(text) = decision {
                self.emit_speech(&text).await;
            }
        }
    }

    /// Advances the step and emits the transition (or completion) messages.
    async fn advance(&mut self, now_ms: u64) {
        let next = self.state.advance_step();
        if let Err(err) = self.deps.repository.update_progress(self.token.as_str(), next).await {
            // retried implicitly on the next progress write
            tracing::error!("could not persist step index: {err:?}");
        }
        if next >= self.state.total_steps {
            self.complete(now_ms).await;
        } else {
            let instruction = self.template.steps[next].instruction.clone();
            self.push(ServerMessage::StepComplete {
                current_step: next,
                total_steps: self.state.total_steps,
                next_instruction: instruction.clone(),
            });
            self.speak_scripted(&format!("Step complete. {instruction}"))
                .await;
        }
    }

    /// Terminal transition: score trust, persist, notify, announce.
    async fn complete(&mut self, now_ms: u64) {
        self.state.complete();
        let trust = self
            .state
            .trust
            .finalize(&self.state.challenge_audit, now_ms);
        tracing::info!(score = trust.score, "session completed");
        let completed_at = format_iso8601(now_ms);
        let extracted = self.state.extraction.committed().to_vec();
        let metadata = serde_json::json!({
            "extractedData": extracted,
            "completedAt": completed_at,
            "trust": trust,
        });
        if let Err(err) = self
            .deps
            .repository
            .complete_session(self.token.as_str(), &metadata)
            .await
        {
            // the in-memory state still reflects completion and the client
            // still receives `completed`
            tracing::error!("could not persist completion: {err:?}");
        }
        ::metrics::counter!(METRICS_ID_SESSIONS_COMPLETED).increment(1);

        if let Some(webhook) = self.deps.webhook.clone() {
            webhook
                .notify_completion(&CompletionEvent {
                    event: "session.completed",
                    session_id: self.state.session_id,
                    platform: &self.state.platform,
                    extracted_data: &extracted,
                    completed_at: &completed_at,
                    trust: &trust,
                })
                .await;
        }

        self.push(ServerMessage::Completed {
            message: COMPLETION_MESSAGE.to_owned(),
            extracted_data: extracted,
        });
        self.speak_scripted(COMPLETION_SPEECH).await;
    }

    /// `requestHint`: a random hint for the current step, or the
    /// instruction itself.
    async fn speak_hint(&mut self) {
        let Some(step) = self.template.steps.get(self.state.current_step) else {
            return;
        };
        let text = match step.hints.as_deref().filter(|hints| !hints.is_empty()) {
            Some(hints) => {
                let hint = &hints[self.rng.gen_range(0..hints.len())];
                format!("Here's a hint: {hint}")
            }
            None => format!("Try this: {}", step.instruction),
        };
        self.speak_scripted(&text).await;
    }

    /// `skipStep`: operator/dev affordance; advances without touching the
    /// trust score.
    async fn skip_step(&mut self) {
        if self.state.is_completed() {
            return;
        }
        let next = self.state.advance_step();
        tracing::info!("skipping to step {next}");
        if let Err(err) = self.deps.repository.update_progress(self.token.as_str(), next).await {
            tracing::error!("could not persist step index: {err:?}");
        }
        if next >= self.state.total_steps {
            self.state.complete();
            let extracted = self.state.extraction.committed().to_vec();
            let metadata = serde_json::json!({
                "extractedData": extracted,
                "completedAt": format_iso8601(self.deps.clock.now_ms()),
            });
            if let Err(err) = self
                .deps
                .repository
                .complete_session(self.token.as_str(), &metadata)
                .await
            {
                tracing::error!("could not persist completion: {err:?}");
            }
            self.push(ServerMessage::Completed {
                message: COMPLETION_MESSAGE.to_owned(),
                extracted_data: extracted,
            });
        } else {
            let instruction = self.template.steps[next].instruction.clone();
            self.push(ServerMessage::StepComplete {
                current_step: next,
                total_steps: self.state.total_steps,
                next_instruction: instruction.clone(),
            });
            self.speak_scripted(&instruction).await;
        }
    }

    /// A scripted emission: bypasses the utterance gate but restarts its
    /// stuck timer.
    async fn speak_scripted(&mut self, text: &str) {
        self.emit_speech(text).await;
        let now_ms = self.deps.clock.now_ms();
        self.state.tts.note_scripted(now_ms);
    }

    /// Synthesizes `text`, downgrading to a text-only `instruction` message
    /// on TTS failure.
    async fn emit_speech(&mut self, text: &str) {
        let started = Instant::now();
        match self.deps.tts.speak(text).await {
            Ok(audio_data) => {
                ::metrics::histogram!(METRICS_ID_TTS_DURATION)
                    .record(started.elapsed().as_millis() as f64);
                self.push(ServerMessage::Audio {
                    text: text.to_owned(),
                    audio_data,
                });
            }
            Err(err) => {
                tracing::warn!("TTS failed, falling back to text: {err:?}");
                self.push(ServerMessage::Instruction {
                    text: text.to_owned(),
                });
            }
        }
    }

    /// Best-effort write of the committed extracted data into the session
    /// row's metadata.
    async fn persist_extracted(&self) {
        let metadata = serde_json::json!({
            "extractedData": self.state.extraction.committed(),
        });
        if let Err(err) = self.deps.repository.save_metadata(self.token.as_str(), &metadata).await {
            // retried on the next extraction commit
            tracing::error!("could not persist extracted data: {err:?}");
        }
    }

}

/// Formats milliseconds since the epoch as an ISO 8601 / RFC 3339 string.
fn format_iso8601(now_ms: u64) -> String {
    let time = UNIX_EPOCH + Duration::from_millis(now_ms);
    humantime::format_rfc3339_millis(time).to_string()
}
