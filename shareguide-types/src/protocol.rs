//! The guided-session wire protocol.
//!
//! Transport is a long-lived bidirectional WebSocket carrying JSON text
//! frames. Inbound ([`ClientMessage`]) and outbound ([`ServerMessage`])
//! messages are discriminated unions tagged on `"type"`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::ExtractedField;

/// Shareguide specific WebSocket close codes.
pub mod close_codes {
    /// The connection exceeded its lifetime or the session expired.
    pub const TIMEOUT: u16 = 4001;
    /// Bad request during the guided session (e.g. parsing error).
    pub const BAD_REQUEST: u16 = 4002;
}

/// Wire-level size and range limits enforced by the message codec.
pub mod limits {
    /// Maximum raw inbound message size before JSON decoding (3 MiB).
    pub const MAX_INBOUND_MESSAGE_BYTES: usize = 3 * 1024 * 1024;
    /// Maximum `imageData` payload inside a valid frame (2 MiB).
    pub const MAX_IMAGE_DATA_BYTES: usize = 2 * 1024 * 1024;
    /// Maximum step index accepted in `linkClicked`.
    pub const MAX_LINK_STEP: u32 = 20;
    /// `challengeId` length bounds.
    pub const MAX_CHALLENGE_ID_LEN: usize = 64;
    /// Maximum `displaySurface` length.
    pub const MAX_DISPLAY_SURFACE_LEN: usize = 64;
    /// Maximum `screenResolution` length.
    pub const MAX_SCREEN_RESOLUTION_LEN: usize = 32;
    /// Maximum `timezone` length.
    pub const MAX_TIMEZONE_LEN: usize = 64;
    /// `devicePixelRatio` upper bound (inclusive).
    pub const MAX_DEVICE_PIXEL_RATIO: f64 = 10.0;
}

/// The client platform reported in `clientInfo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientPlatform {
    /// Browser client.
    Web,
    /// iOS broadcast-extension client.
    Ios,
    /// Android media-projection client.
    Android,
}

impl ClientPlatform {
    /// The platform tag as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientPlatform::Web => "web",
            ClientPlatform::Ios => "ios",
            ClientPlatform::Android => "android",
        }
    }
}

/// Inbound client → server messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// One captured screen frame.
    #[serde(rename_all = "camelCase")]
    Frame {
        /// Base64/data-url encoded screenshot, at most
        /// [`limits::MAX_IMAGE_DATA_BYTES`] bytes.
        image_data: String,
        /// Optional client-computed hash of the frame contents.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_hash: Option<String>,
    },
    /// The user confirmed they opened the step's navigation link.
    LinkClicked {
        /// Step index, in `[0, limits::MAX_LINK_STEP]`.
        step: u32,
    },
    /// Playback of a previously sent audio message finished (historical).
    AudioComplete,
    /// Keep-alive; answered with `pong`.
    Ping,
    /// Ask for a spoken hint for the current step.
    RequestHint,
    /// Operator/dev affordance: advance past the current step.
    SkipStep,
    /// Acknowledge receipt of a challenge (logged, not required).
    #[serde(rename_all = "camelCase")]
    ChallengeAck {
        /// The challenge id being acknowledged, 1..=64 chars.
        challenge_id: String,
    },
    /// Client environment details folded into the trust signals.
    #[serde(rename_all = "camelCase")]
    ClientInfo {
        /// Client platform.
        platform: ClientPlatform,
        /// `getDisplayMedia` display surface ("monitor", "window", ...).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_surface: Option<String>,
        /// Screen resolution, e.g. `1920x1080`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screen_resolution: Option<String>,
        /// Device pixel ratio in `[0, 10]`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_pixel_ratio: Option<f64>,
        /// IANA timezone name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
}

/// Outbound server → client messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Session accepted; sent once after the WebSocket opens.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Server-side session id.
        session_id: Uuid,
        /// Current (possibly resumed) step index.
        current_step: usize,
        /// Total number of steps in the template.
        total_steps: usize,
        /// The current step's instruction.
        instruction: String,
    },
    /// A frame passed the gates and was handed to the vision model.
    Analyzing,
    /// Per-frame analysis result.
    #[serde(rename_all = "camelCase")]
    Analysis {
        /// Whether the frame matched the active success criterion.
        matches_success: bool,
        /// Clamped model confidence.
        confidence: f64,
        /// This frame's schema-filtered extracted pairs.
        extracted_data: Vec<ExtractedField>,
        /// URL verification verdict, when the step asserts a host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_verified: Option<bool>,
    },
    /// The current step completed and the session advanced.
    #[serde(rename_all = "camelCase")]
    StepComplete {
        /// The new step index.
        current_step: usize,
        /// Total number of steps in the template.
        total_steps: usize,
        /// The next step's instruction.
        next_instruction: String,
    },
    /// All steps completed.
    #[serde(rename_all = "camelCase")]
    Completed {
        /// Human-readable completion message.
        message: String,
        /// The committed extracted data.
        extracted_data: Vec<ExtractedField>,
    },
    /// Spoken guidance with synthesized audio.
    #[serde(rename_all = "camelCase")]
    Audio {
        /// The spoken text.
        text: String,
        /// Base64 encoded audio bytes.
        audio_data: String,
    },
    /// Text-only guidance (TTS fallback).
    Instruction {
        /// The guidance text.
        text: String,
    },
    /// A human-readable error.
    Error {
        /// What went wrong.
        message: String,
    },
    /// Keep-alive answer.
    Pong,
    /// An interaction challenge was issued.
    #[serde(rename_all = "camelCase")]
    Challenge {
        /// Opaque challenge id.
        challenge_id: String,
        /// The challenge instruction to relay to the user.
        instruction: String,
        /// Time budget for fulfilling the challenge.
        timeout_ms: u64,
    },
}

impl ServerMessage {
    /// Builds an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
