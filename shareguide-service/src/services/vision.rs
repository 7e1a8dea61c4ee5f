//! The vision port.
//!
//! The engine analyzes frames exclusively through the [`VisionAnalyzer`]
//! trait; any provider satisfying it plugs in. Providers are expected to
//! clamp confidence into `[0, 1]`, drop extracted items with an empty label
//! or value, and return [`FrameAnalysis::transport_failure`] instead of an
//! error for recoverable transport problems so a single flaky call does not
//! abort the frame pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use shareguide_types::analysis::FrameAnalysis;
use shareguide_types::template::ExtractionField;

/// Dynamic trait object for the vision service.
///
/// Must be `Send + Sync` to work with async contexts (e.g., Axum).
pub type VisionService = Arc<dyn VisionAnalyzer + Send + Sync>;

/// Everything the vision model needs to score one frame.
#[derive(Debug)]
pub struct VisionRequest<'a> {
    /// Base64/data-url encoded screenshot.
    pub image_base64: &'a str,
    /// The active instruction (the step's, or the challenge's while one is
    /// awaiting verification).
    pub instruction: &'a str,
    /// The active success criterion.
    pub success_criteria: &'a str,
    /// The step's extraction schema; absent while a challenge is active.
    pub extraction_schema: Option<&'a [ExtractionField]>,
    /// Expected host for URL verification; absent while a challenge is
    /// active.
    pub expected_domain: Option<&'a str>,
    /// The previous frame's description, for visual-continuity assessment.
    /// Absent on the first analyzed frame.
    pub previous_frame_description: Option<&'a str>,
}

/// Trait that vision provider implementations must provide.
#[async_trait]
pub trait VisionAnalyzer {
    /// Scores one frame against the active criterion and extracts the
    /// requested fields.
    async fn analyze(&self, request: VisionRequest<'_>) -> eyre::Result<FrameAnalysis>;
}
