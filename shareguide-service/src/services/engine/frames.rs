//! The frame pipeline: debounce, link gate, vision call, state update,
//! output dispatch.
//!
//! Frames are ordered by arrival; the debouncer drops, never reorders. Any
//! vision failure inside the pipeline returns the session to `waiting`,
//! emits `error{"Analysis failed"}`, and leaves progress untouched.

use std::time::Instant;

use shareguide_core::limits::SUCCESS_CONFIDENCE_FLOOR;
use shareguide_core::session::SessionStatus;
use shareguide_types::analysis::ExtractedField;
use shareguide_types::protocol::ServerMessage;
use tracing::instrument;

use crate::metrics::{METRICS_ID_FRAMES_ANALYZED, METRICS_ID_VISION_DURATION};
use crate::services::engine::SessionEngine;
use crate::services::vision::VisionRequest;

impl SessionEngine {
    /// Runs one inbound frame through the pipeline.
    #[instrument(level = "debug", skip_all, fields(step = self.state.current_step))]
    pub(crate) async fn process_frame(&mut self, image_data: &str, frame_hash: Option<String>) {
        let now_ms = self.deps.clock.now_ms();
        if self.state.debounced(now_ms, self.deps.tuning.debounce_ms) {
            tracing::trace!("frame debounced");
            return;
        }
        if self.state.is_completed() {
            tracing::trace!("session already completed, dropping frame");
            return;
        }
        let step = &self.template.steps[self.state.current_step];
        if !self.state.link_gate_open(step.require_link_click) {
            tracing::debug!("link gate closed, dropping frame");
            return;
        }
        let step_schema = step.extraction_fields.clone();
        let step_domain = step.expected_domain.clone();
        // while a challenge awaits verification, frames are scored against
        // its criterion and extraction is suspended
        let challenge_active = self.state.active_challenge.is_some();
        let (instruction, success_criteria) = match &self.state.active_challenge {
            Some(active) => (active.instruction.clone(), active.success_criteria.clone()),
            None => (step.instruction.clone(), step.success_criteria.clone()),
        };

        self.state.status = SessionStatus::Analyzing;
        self.state.last_analysis_at_ms = Some(now_ms);
        self.state.trust.record_frame_timestamp(now_ms);
        if let Some(hash) = frame_hash {
            self.state.trust.record_frame_hash(hash);
        }
        self.push(ServerMessage::Analyzing);

        let extraction_schema = (!challenge_active)
            .then_some(step_schema.as_deref())
            .flatten();
        let expected_domain = (!challenge_active)
            .then_some(step_domain.as_deref())
            .flatten();
        let previous_description = self
            .state
            .trust
            .previous_description()
            .map(str::to_owned);

        let started = Instant::now();
        let analysis = self
            .deps
            .vision
            .analyze(VisionRequest {
                image_base64: image_data,
                instruction: &instruction,
                success_criteria: &success_criteria,
                extraction_schema,
                expected_domain,
                previous_frame_description: previous_description.as_deref(),
            })
            .await;
        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!("vision analysis failed: {err:?}");
                self.state.status = SessionStatus::Waiting;
                self.push(ServerMessage::error("Analysis failed"));
                return;
            }
        };
        ::metrics::histogram!(METRICS_ID_VISION_DURATION)
            .record(started.elapsed().as_millis() as f64);
        ::metrics::counter!(METRICS_ID_FRAMES_ANALYZED).increment(1);

        let confidence = analysis.clamped_confidence();
        let step_has_expected_domain = expected_domain.is_some();
        self.state
            .trust
            .record_url_verdict(analysis.url_verified, step_has_expected_domain);
        self.state.trust.record_continuity(analysis.visual_continuity);
        self.state.trust.note_frame_analyzed();
        self.state
            .trust
            .set_previous_description(analysis.description.clone());

        let survivors = self.filter_to_schema(analysis.extracted_data.as_deref());
        if !survivors.is_empty()
            && self
                .state
                .extraction
                .observe(&survivors, self.deps.tuning.consensus_threshold)
        {
            self.persist_extracted().await;
        }

        self.push(ServerMessage::Analysis {
            matches_success: analysis.matches_success_criteria,
            confidence,
            extracted_data: survivors,
            url_verified: analysis.url_verified,
        });

        if analysis.matches_success_criteria && confidence > SUCCESS_CONFIDENCE_FLOOR {
            self.on_success(now_ms).await;
        } else {
            self.on_failure(analysis.suggested_action.as_deref(), now_ms)
                .await;
        }

        if self.state.status == SessionStatus::Analyzing {
            self.state.status = SessionStatus::Waiting;
        }
    }

    /// Keeps only pairs whose label appears in some step's extraction
    /// schema (case-sensitive).
    fn filter_to_schema(&self, extracted: Option<&[ExtractedField]>) -> Vec<ExtractedField> {
        let Some(extracted) = extracted else {
            return Vec::new();
        };
        let known = self.template.known_field_names();
        extracted
            .iter()
            .filter(|field| known.contains(field.label.as_str()))
            .cloned()
            .collect()
    }
}
