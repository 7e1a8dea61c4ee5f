//! The wire codec for the guided-session WebSocket.
//!
//! Inbound frames are size-checked before JSON decoding and validated
//! against the per-message limits; outbound messages serialize to JSON text
//! frames. Every decode failure maps to a human-readable `error` reply, the
//! connection stays open, and state is untouched.

use axum::extract::ws;
use shareguide_types::protocol::{ClientMessage, ServerMessage, limits};

/// Why an inbound frame was rejected.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("message exceeds {} bytes", limits::MAX_INBOUND_MESSAGE_BYTES)]
    MessageTooLarge,
    #[error("frame image too large or invalid")]
    ImageTooLarge,
    #[error("invalid message format")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message format")]
    UnsupportedFrame,
    #[error("invalid {0}")]
    FieldOutOfRange(&'static str),
}

impl DecodeError {
    /// The `error` reply sent to the client for this rejection.
    pub(crate) fn reply(&self) -> ServerMessage {
        match self {
            DecodeError::ImageTooLarge => ServerMessage::error(
                "Frame image too large or invalid",
            ),
            DecodeError::MessageTooLarge => ServerMessage::error("Message too large"),
            DecodeError::Malformed(_)
            | DecodeError::UnsupportedFrame
            | DecodeError::FieldOutOfRange(_) => {
                ServerMessage::error("Invalid message format")
            }
        }
    }
}

/// Decodes and validates one inbound WebSocket message.
///
/// Accepts only `Text` frames; the raw payload is capped before parsing and
/// the decoded message is validated against the field limits.
pub(crate) fn decode(message: &ws::Message) -> Result<ClientMessage, DecodeError> {
    let text = match message {
        ws::Message::Text(text) => text,
        _ => return Err(DecodeError::UnsupportedFrame),
    };
    if text.len() > limits::MAX_INBOUND_MESSAGE_BYTES {
        return Err(DecodeError::MessageTooLarge);
    }
    let decoded: ClientMessage = serde_json::from_slice(text.as_bytes())?;
    validate(&decoded)?;
    Ok(decoded)
}

/// Serializes one outbound message to a `Text` frame.
pub(crate) fn encode(message: &ServerMessage) -> ws::Message {
    let serialized = serde_json::to_string(message).expect("Can serialize response");
    ws::Message::text(serialized)
}

fn validate(message: &ClientMessage) -> Result<(), DecodeError> {
    match message {
        ClientMessage::Frame { image_data, .. } => {
            if image_data.len() > limits::MAX_IMAGE_DATA_BYTES {
                return Err(DecodeError::ImageTooLarge);
            }
        }
        ClientMessage::LinkClicked { step } => {
            if *step > limits::MAX_LINK_STEP {
                return Err(DecodeError::FieldOutOfRange("step"));
            }
        }
        ClientMessage::ChallengeAck { challenge_id } => {
            if challenge_id.is_empty() || challenge_id.len() > limits::MAX_CHALLENGE_ID_LEN {
                return Err(DecodeError::FieldOutOfRange("challengeId"));
            }
        }
        ClientMessage::ClientInfo {
            display_surface,
            screen_resolution,
            device_pixel_ratio,
            timezone,
            ..
        } => {
            if display_surface
                .as_deref()
                .is_some_and(|s| s.len() > limits::MAX_DISPLAY_SURFACE_LEN)
            {
                return Err(DecodeError::FieldOutOfRange("displaySurface"));
            }
            if screen_resolution
                .as_deref()
                .is_some_and(|s| s.len() > limits::MAX_SCREEN_RESOLUTION_LEN)
            {
                return Err(DecodeError::FieldOutOfRange("screenResolution"));
            }
            if device_pixel_ratio
                .is_some_and(|r| !(0.0..=limits::MAX_DEVICE_PIXEL_RATIO).contains(&r))
            {
                return Err(DecodeError::FieldOutOfRange("devicePixelRatio"));
            }
            if timezone
                .as_deref()
                .is_some_and(|s| s.len() > limits::MAX_TIMEZONE_LEN)
            {
                return Err(DecodeError::FieldOutOfRange("timezone"));
            }
        }
        ClientMessage::AudioComplete
        | ClientMessage::Ping
        | ClientMessage::RequestHint
        | ClientMessage::SkipStep => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shareguide_types::protocol::limits::{MAX_IMAGE_DATA_BYTES, MAX_INBOUND_MESSAGE_BYTES};

    fn text_message(payload: String) -> ws::Message {
        ws::Message::text(payload)
    }

    fn frame_json(image_bytes: usize) -> String {
        format!(
            r#"{{"type":"frame","imageData":"{}"}}"#,
            "A".repeat(image_bytes)
        )
    }

    #[test]
    fn image_data_at_the_cap_is_accepted() {
        let decoded = decode(&text_message(frame_json(MAX_IMAGE_DATA_BYTES)))
            .expect("frame at the cap decodes");
        assert!(matches!(decoded, ClientMessage::Frame { .. }));
    }

    #[test]
    fn image_data_over_the_cap_is_rejected() {
        let err = decode(&text_message(frame_json(MAX_IMAGE_DATA_BYTES + 100)))
            .expect_err("oversize image is rejected");
        assert!(matches!(err, DecodeError::ImageTooLarge));
        match err.reply() {
            ServerMessage::Error { message } => {
                assert!(message.contains("too large or invalid"))
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn whole_message_over_the_cap_is_rejected_pre_parse() {
        // valid JSON would not even matter here
        let payload = "x".repeat(MAX_INBOUND_MESSAGE_BYTES + 1);
        let err = decode(&text_message(payload)).expect_err("oversize message is rejected");
        assert!(matches!(err, DecodeError::MessageTooLarge));
    }

    #[test]
    fn binary_frames_are_rejected() {
        let err = decode(&ws::Message::binary(vec![1, 2, 3]))
            .expect_err("binary frames are rejected");
        assert!(matches!(err, DecodeError::UnsupportedFrame));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err =
            decode(&text_message("{not json".to_owned())).expect_err("garbage is rejected");
        assert!(matches!(err, DecodeError::Malformed(_)));
        match err.reply() {
            ServerMessage::Error { message } => assert_eq!(message, "Invalid message format"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn link_step_bounds() {
        let decoded = decode(&text_message(
            r#"{"type":"linkClicked","step":20}"#.to_owned(),
        ))
        .expect("step 20 decodes");
        assert!(matches!(decoded, ClientMessage::LinkClicked { step: 20 }));
        let err = decode(&text_message(
            r#"{"type":"linkClicked","step":21}"#.to_owned(),
        ))
        .expect_err("step 21 is rejected");
        assert!(matches!(err, DecodeError::FieldOutOfRange("step")));
    }

    #[test]
    fn challenge_ack_id_bounds() {
        let err = decode(&text_message(
            r#"{"type":"challengeAck","challengeId":""}"#.to_owned(),
        ))
        .expect_err("empty id is rejected");
        assert!(matches!(err, DecodeError::FieldOutOfRange("challengeId")));

        let long_id = "c".repeat(65);
        let err = decode(&text_message(format!(
            r#"{{"type":"challengeAck","challengeId":"{long_id}"}}"#
        )))
        .expect_err("oversize id is rejected");
        assert!(matches!(err, DecodeError::FieldOutOfRange("challengeId")));
    }

    #[test]
    fn client_info_ranges() {
        let err = decode(&text_message(
            r#"{"type":"clientInfo","platform":"web","devicePixelRatio":11.0}"#.to_owned(),
        ))
        .expect_err("dpr over 10 is rejected");
        assert!(matches!(
            err,
            DecodeError::FieldOutOfRange("devicePixelRatio")
        ));
    }

    #[test]
    fn encode_produces_text_frames() {
        let message = encode(&ServerMessage::Pong);
        match message {
            ws::Message::Text(text) => assert_eq!(text.as_str(), r#"{"type":"pong"}"#),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
