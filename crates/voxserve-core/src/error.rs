//! Unified error types for the synthesis server.
//!
//! Every error that can cross the external interface carries a stable code
//! (see [`SynthError::code`]); handlers serialize `{code, message}` and
//! nothing else.

/// Main error type for synthesis operations.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Input text is empty or not usable as text.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// No rule set or fallback normalizer for the requested locale.
    #[error("unsupported locale: {0}")]
    UnsupportedLocale(String),

    /// Voice identifier is not in the model catalog.
    #[error("unknown voice: {0}")]
    ModelNotFound(String),

    /// Model weights could not be loaded.
    #[error("model load failed for voice '{voice}': {reason}")]
    ModelLoad { voice: String, reason: String },

    /// Admission rejected: capacity exhausted or wait timed out.
    #[error("overloaded: {0}")]
    Overloaded(String),

    /// External recognition endpoint failed or timed out.
    #[error("asr unavailable: {0}")]
    AsrUnavailable(String),

    /// Reference audio exceeds the configured size cap.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Device-level failure during synthesis.
    #[error("inference error: {0}")]
    Inference(String),

    /// External encoding tool failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with SynthError.
pub type SynthResult<T> = Result<T, SynthError>;

impl SynthError {
    /// Stable external error code for this error.
    ///
    /// Codes are part of the API contract and must not change between
    /// releases. Ambient variants (`Config`, `Io`) map to `Internal`
    /// since they never carry information a client can act on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MalformedInput",
            Self::UnsupportedLocale(_) => "UnsupportedLocale",
            Self::ModelNotFound(_) => "ModelNotFound",
            Self::ModelLoad { .. } => "ModelLoadError",
            Self::Overloaded(_) => "Overloaded",
            Self::AsrUnavailable(_) => "AsrUnavailable",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
            Self::Inference(_) => "InferenceError",
            Self::Encoding(_) => "EncodingError",
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "Internal",
        }
    }

    /// Whether a client may retry the request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded(_) | Self::AsrUnavailable(_))
    }

    /// Create a malformed-input error with message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Create an inference error with message.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create an encoding error with message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a config error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a model-load error.
    pub fn model_load(voice: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            voice: voice.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SynthError::malformed("empty text");
        assert_eq!(err.to_string(), "malformed input: empty text");

        let err = SynthError::PayloadTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(err.to_string(), "payload too large: 2048 bytes (limit 1024)");
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(SynthError::malformed("x").code(), "MalformedInput");
        assert_eq!(SynthError::UnsupportedLocale("xx".into()).code(), "UnsupportedLocale");
        assert_eq!(SynthError::ModelNotFound("v".into()).code(), "ModelNotFound");
        assert_eq!(SynthError::model_load("v", "bad").code(), "ModelLoadError");
        assert_eq!(SynthError::Overloaded("full".into()).code(), "Overloaded");
        assert_eq!(SynthError::AsrUnavailable("down".into()).code(), "AsrUnavailable");
        assert_eq!(
            SynthError::PayloadTooLarge { size: 1, limit: 0 }.code(),
            "PayloadTooLarge"
        );
        assert_eq!(SynthError::inference("oom").code(), "InferenceError");
        assert_eq!(SynthError::encoding("exit 1").code(), "EncodingError");
        assert_eq!(SynthError::config("bad port").code(), "Internal");
    }

    #[test]
    fn test_retryable() {
        assert!(SynthError::Overloaded("full".into()).is_retryable());
        assert!(SynthError::AsrUnavailable("down".into()).is_retryable());
        assert!(!SynthError::inference("oom").is_retryable());
        assert!(!SynthError::malformed("empty").is_retryable());
    }
}
