//! Trait definitions for pipeline components.

use async_trait::async_trait;

use crate::error::SynthResult;
use crate::types::{AudioBuffer, Locale, NormalizedUtterance, OutputFormat};

/// Text normalization trait.
///
/// Implementations convert raw input text into a pronounceable token
/// sequence, handling numbers, abbreviations, punctuation, etc.
pub trait TextFrontend: Send + Sync {
    /// Normalize raw input text for the given locale.
    ///
    /// # Arguments
    /// * `input` - Raw input text
    /// * `locale` - Target locale for expansion rules
    ///
    /// # Returns
    /// The normalized utterance, or `MalformedInput` / `UnsupportedLocale`.
    fn normalize(&self, input: &str, locale: Locale) -> SynthResult<NormalizedUtterance>;
}

/// Speech recognition trait for recovering reference transcripts.
///
/// Implementations forward reference audio to an external recognition
/// service and return the transcript.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a reference audio clip.
    ///
    /// # Arguments
    /// * `audio` - Encoded audio bytes as uploaded by the client
    ///
    /// # Returns
    /// The recognized text, or `AsrUnavailable` / `PayloadTooLarge`.
    async fn transcribe(&self, audio: &[u8]) -> SynthResult<String>;
}

/// Audio encoding trait for the post-processing stage.
///
/// Implementations turn raw PCM into the requested output container.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode a raw audio buffer into the given format.
    ///
    /// # Arguments
    /// * `audio` - Raw PCM buffer from the inference engine
    /// * `format` - Requested output container
    ///
    /// # Returns
    /// The complete encoded file bytes, or `EncodingError`.
    async fn encode(&self, audio: &AudioBuffer, format: OutputFormat) -> SynthResult<Vec<u8>>;
}
