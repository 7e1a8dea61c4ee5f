//! The verification template model.
//!
//! A [`Template`] is an ordered sequence of [`TemplateStep`]s the engine
//! walks a user through. Steps vary in which of {link, extraction schema,
//! expected host, challenges, hints} are present; they are modeled as a
//! single record with optional fields.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A verification template: the ordered instruction sequence for one
/// platform flow (e.g. "verify an Instagram story's reach").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Template id.
    pub id: Uuid,
    /// Human-readable template name.
    pub name: String,
    /// Platform tag this template targets (e.g. `instagram`).
    pub platform: String,
    /// The ordered steps.
    pub steps: Vec<TemplateStep>,
}

impl Template {
    /// The union of all steps' extraction field names.
    ///
    /// The frame pipeline only accepts extracted pairs whose label appears
    /// here; labels are matched with case-sensitive equality.
    pub fn known_field_names(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .filter_map(|step| step.extraction_fields.as_deref())
            .flatten()
            .map(|field| field.name.as_str())
            .collect()
    }
}

/// One element of a template's ordered instruction sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStep {
    /// Prose instruction shown (and spoken) to the user.
    pub instruction: String,
    /// Prose success criterion the vision model scores frames against.
    pub success_criteria: String,
    /// Optional navigation link the user should open for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<StepLink>,
    /// Named fields the vision model should read off the screen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_fields: Option<Vec<ExtractionField>>,
    /// When `true`, frames are ignored until the user confirms the link
    /// click for this step.
    #[serde(default)]
    pub require_link_click: bool,
    /// Expected host for URL verification of analyzed frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_domain: Option<String>,
    /// Interaction challenges that may be randomly injected on this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenges: Option<Vec<ChallengeSpec>>,
    /// Optional hints served on `requestHint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<String>>,
}

impl TemplateStep {
    /// Returns `true` iff this step defines at least one extraction field
    /// flagged as required.
    pub fn has_required_fields(&self) -> bool {
        self.extraction_fields
            .as_deref()
            .is_some_and(|fields| fields.iter().any(|field| field.required))
    }

    /// Iterates over the required extraction field names of this step.
    pub fn required_field_names(&self) -> impl Iterator<Item = &str> {
        self.extraction_fields
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name.as_str())
    }
}

/// A navigation link attached to a step.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLink {
    /// Target URL.
    pub url: String,
    /// Display label.
    pub label: String,
}

/// One named field the vision model should extract for a step.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionField {
    /// Field name; extracted labels must match this with case-sensitive
    /// equality.
    pub name: String,
    /// Prose description passed to the vision model.
    pub description: String,
    /// Whether the step cannot complete until this field is committed.
    #[serde(default)]
    pub required: bool,
}

/// A randomly-injected interaction challenge definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
    /// Prose instruction ("click Notifications").
    pub instruction: String,
    /// Prose criterion a subsequent frame must satisfy.
    pub success_criteria: String,
    /// Per-challenge timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
