//! Core data types for the synthesis pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SynthError, SynthResult};

/// Supported normalization locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Chinese (Mandarin).
    Zh,
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locale::En => write!(f, "en"),
            Locale::Zh => write!(f, "zh"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            "zh" | "zh-cn" => Ok(Locale::Zh),
            other => Err(SynthError::UnsupportedLocale(other.to_string())),
        }
    }
}

/// Output container for encoded audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Uncompressed WAV (PCM S16LE). Written directly, no external tool.
    #[default]
    Wav,
    /// MPEG layer 3.
    Mp3,
    /// Ogg Vorbis.
    Ogg,
    /// FLAC lossless.
    Flac,
}

impl OutputFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Ogg => "ogg",
            OutputFormat::Flac => "flac",
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Ogg => "audio/ogg",
            OutputFormat::Flac => "audio/flac",
        }
    }

    /// Container name as understood by the external encoding tool.
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Ogg => "ogg",
            OutputFormat::Flac => "flac",
        }
    }
}

/// How the target voice is selected.
///
/// Exactly one of the two variants applies to a request; the gateway
/// rejects requests that set both or neither.
#[derive(Debug, Clone)]
pub enum VoiceSource {
    /// A pretrained voice from the model catalog.
    VoiceId(String),
    /// A short reference clip for voice cloning, with an optional
    /// transcript. A missing transcript is recovered via the ASR bridge.
    Reference {
        audio: Vec<u8>,
        transcript: Option<String>,
    },
}

impl VoiceSource {
    /// The catalog voice id, if this source names one.
    pub fn voice_id(&self) -> Option<&str> {
        match self {
            VoiceSource::VoiceId(id) => Some(id),
            VoiceSource::Reference { .. } => None,
        }
    }
}

/// A synthesis request, validated by the gateway before entering
/// the pipeline.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Text to synthesize.
    pub text: String,
    /// Normalization locale.
    pub locale: Locale,
    /// Voice selection.
    pub source: VoiceSource,
    /// Output container.
    pub format: OutputFormat,
    /// Stream encoded chunks instead of buffering the full clip.
    pub stream: bool,
    /// Speed multiplier, 0.5..=2.0.
    pub speed: f32,
    /// Random seed for reproducible generation.
    pub seed: Option<u64>,
}

impl SynthesisRequest {
    /// Create a request for a catalog voice with default settings.
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            text: text.into(),
            locale: Locale::default(),
            source: VoiceSource::VoiceId(voice.into()),
            format: OutputFormat::default(),
            stream: false,
            speed: 1.0,
            seed: None,
        }
    }

    /// Create a voice-cloning request from a reference clip.
    pub fn cloning(
        text: impl Into<String>,
        audio: Vec<u8>,
        transcript: Option<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            text: text.into(),
            locale: Locale::default(),
            source: VoiceSource::Reference { audio, transcript },
            format: OutputFormat::default(),
            stream: false,
            speed: 1.0,
            seed: None,
        }
    }

    /// Set the locale.
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the speed multiplier.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable streaming output.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A normalized, pronounceable token sequence.
///
/// Produced once by the text frontend and consumed once by the
/// inference engine; never mutated in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedUtterance {
    tokens: Vec<String>,
    locale: Locale,
}

impl NormalizedUtterance {
    /// Create an utterance from pre-normalized tokens.
    pub fn new(tokens: Vec<String>, locale: Locale) -> Self {
        Self { tokens, locale }
    }

    /// The pronounceable tokens in order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The locale the tokens were produced for.
    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the utterance carries no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Joined text form, for logging and tests.
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    /// Consume the utterance, yielding its tokens.
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

/// Raw audio produced by the inference engine.
///
/// Owned by the post-processor until encoded, then by the gateway for
/// transmission.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// PCM samples (f32, interleaved if multi-channel).
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 = mono).
    pub channels: u16,
}

impl AudioBuffer {
    /// Create a mono buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 * 1000.0 / self.sample_rate as f32
    }

    /// Convert samples to PCM S16LE bytes.
    pub fn to_pcm_s16le(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&sample_i16.to_le_bytes());
        }
        bytes
    }

    /// Serialize as a complete WAV file (PCM S16LE).
    pub fn to_wav_bytes(&self) -> SynthResult<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| SynthError::internal(format!("wav writer: {e}")))?;
            for &sample in &self.samples {
                let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| SynthError::internal(format!("wav write: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| SynthError::internal(format!("wav finalize: {e}")))?;
        }
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_parse() {
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("zh-CN".parse::<Locale>().unwrap(), Locale::Zh);
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn test_output_format_metadata() {
        assert_eq!(OutputFormat::Wav.extension(), "wav");
        assert_eq!(OutputFormat::Mp3.content_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Flac.muxer(), "flac");
    }

    #[test]
    fn test_request_builder() {
        let req = SynthesisRequest::new("hello", "alloy")
            .with_locale(Locale::En)
            .with_format(OutputFormat::Mp3)
            .with_speed(1.5)
            .with_seed(42)
            .streaming();

        assert_eq!(req.text, "hello");
        assert_eq!(req.source.voice_id(), Some("alloy"));
        assert_eq!(req.format, OutputFormat::Mp3);
        assert!(req.stream);
        assert_eq!(req.seed, Some(42));
    }

    #[test]
    fn test_cloning_request_has_no_voice_id() {
        let req = SynthesisRequest::cloning("hi", vec![0u8; 16], None);
        assert!(req.source.voice_id().is_none());
    }

    #[test]
    fn test_utterance() {
        let utt = NormalizedUtterance::new(
            vec!["one".into(), "hundred".into()],
            Locale::En,
        );
        assert_eq!(utt.len(), 2);
        assert_eq!(utt.text(), "one hundred");
        assert_eq!(utt.into_tokens().len(), 2);
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buf = AudioBuffer::mono(vec![0.0; 24000], 24000);
        assert_eq!(buf.frames(), 24000);
        assert!((buf.duration_ms() - 1000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_audio_buffer_pcm_bytes() {
        let buf = AudioBuffer::mono(vec![0.0, 0.5, -0.5, 2.0, -2.0], 16000);
        let bytes = buf.to_pcm_s16le();
        assert_eq!(bytes.len(), 10);

        // Out-of-range samples clamp.
        let clamped = i16::from_le_bytes([bytes[6], bytes[7]]);
        assert_eq!(clamped, i16::MAX);
    }

    #[test]
    fn test_audio_buffer_wav_bytes() {
        let buf = AudioBuffer::mono(vec![0.1; 100], 16000);
        let wav = buf.to_wav_bytes().unwrap();
        // RIFF header plus 2 bytes per sample.
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 200);
    }
}
