//! The frame-analysis contract between the engine and vision providers.
//!
//! Any vision provider satisfies the engine by producing a
//! [`FrameAnalysis`] per frame. Providers are expected to clamp confidence
//! into `[0, 1]` and to drop extracted items with an empty label or value;
//! the engine applies [`FrameAnalysis::clamped_confidence`] defensively
//! regardless.

use serde::{Deserialize, Serialize};

/// One extracted `(label, value)` pair read off the user's screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    /// Field label, matching an extraction-schema field name.
    pub label: String,
    /// The value as read from the screen.
    pub value: String,
}

impl ExtractedField {
    /// Convenience constructor.
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// The result of scoring a single frame against a step (or challenge)
/// criterion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysis {
    /// Prose description of what is visible in the frame.
    pub description: String,
    /// Salient UI elements the model detected.
    #[serde(default)]
    pub detected_elements: Vec<String>,
    /// Whether the frame satisfies the active success criterion.
    pub matches_success_criteria: bool,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    /// Suggested next action for the user when the criterion is not met.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    /// Extracted `(label, value)` pairs, if an extraction schema was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Vec<ExtractedField>>,
    /// Whether the visible URL matches the expected host, if one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_verified: Option<bool>,
    /// Whether the frame is visually continuous with the previous frame
    /// description. `None` on the first analyzed frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_continuity: Option<bool>,
}

impl FrameAnalysis {
    /// The safe default a provider returns on transport failure.
    pub fn transport_failure() -> Self {
        Self {
            description: "Unable to analyze frame".to_owned(),
            detected_elements: Vec::new(),
            matches_success_criteria: false,
            confidence: 0.0,
            suggested_action: Some(
                "Please hold the screen steady and try again".to_owned(),
            ),
            extracted_data: None,
            url_verified: None,
            visual_continuity: None,
        }
    }

    /// The confidence clamped into `[0, 1]`; `NaN` clamps to `0`.
    pub fn clamped_confidence(&self) -> f64 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(confidence: f64) -> FrameAnalysis {
        FrameAnalysis {
            confidence,
            ..FrameAnalysis::transport_failure()
        }
    }

    #[test]
    fn confidence_clamping() {
        assert_eq!(analysis(f64::NAN).clamped_confidence(), 0.0);
        assert_eq!(analysis(-0.3).clamped_confidence(), 0.0);
        assert_eq!(analysis(1.7).clamped_confidence(), 1.0);
        assert_eq!(analysis(0.42).clamped_confidence(), 0.42);
    }

    #[test]
    fn transport_failure_is_a_non_match() {
        let fallback = FrameAnalysis::transport_failure();
        assert!(!fallback.matches_success_criteria);
        assert_eq!(fallback.confidence, 0.0);
        assert!(fallback.suggested_action.is_some());
    }
}
