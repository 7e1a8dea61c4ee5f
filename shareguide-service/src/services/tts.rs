//! The text-to-speech port.
//!
//! Spoken guidance reaches clients as base64 audio inside an `audio`
//! message. Providers must fail with a distinguishable [`TtsError`] so the
//! engine can downgrade to the text-only `instruction` fallback.

use std::sync::Arc;

use async_trait::async_trait;

/// Dynamic trait object for the TTS service.
///
/// Must be `Send + Sync` to work with async contexts (e.g., Axum).
pub type TtsService = Arc<dyn SpeechSynthesizer + Send + Sync>;

/// Errors a TTS provider may fail with.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// The provider rejected or could not fulfill the request.
    #[error("TTS provider failure: {0}")]
    Provider(String),
}

/// Trait that TTS provider implementations must provide.
#[async_trait]
pub trait SpeechSynthesizer {
    /// Synthesizes `text` and returns base64 encoded audio bytes.
    async fn speak(&self, text: &str) -> Result<String, TtsError>;
}

/// Escapes `text` for embedding into SSML markup.
///
/// Providers that build SSML documents must pass user-visible guidance
/// through this before interpolation.
pub fn escape_ssml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssml_escaping_covers_the_reserved_characters() {
        assert_eq!(
            escape_ssml(r#"Tom & Jerry's <"reach">"#),
            "Tom &amp; Jerry&apos;s &lt;&quot;reach&quot;&gt;"
        );
        assert_eq!(escape_ssml("plain text"), "plain text");
    }
}
