//! Waveform generation.
//!
//! The engine turns a normalized utterance and a resident voice model
//! into raw PCM. Generation runs on a blocking thread under the
//! caller's admission ticket with a hard timeout; a timeout or device
//! fault surfaces as `InferenceError` and never holds transient
//! buffers past the call.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};
use voxserve_core::{AudioBuffer, InferenceConfig, NormalizedUtterance, SynthError, SynthResult};

use crate::models::ModelHandle;

/// Conditioning vector derived from a reference clip, used for voice
/// cloning in place of a catalog speaker identity.
#[derive(Debug, Clone)]
pub struct ReferenceEmbedding {
    values: Vec<f32>,
}

impl ReferenceEmbedding {
    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Speed multiplier, 0.5..=2.0.
    pub speed: f32,
    /// Random seed for reproducible generation.
    pub seed: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            seed: None,
        }
    }
}

/// Synthesizes audio from normalized utterances.
#[derive(Debug)]
pub struct InferenceEngine {
    timeout: Duration,
    fallback_sample_rate: u32,
}

const EMBEDDING_DIM: usize = 64;

/// Base duration of one token's audio at speed 1.0.
const TOKEN_DURATION_MS: u64 = 180;

impl InferenceEngine {
    /// Create an engine from configuration.
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.generation_timeout_secs),
            fallback_sample_rate: config.sample_rate,
        }
    }

    /// Derive a conditioning embedding from reference audio and its
    /// transcript.
    pub fn embed_reference(&self, audio: &[u8], transcript: &str) -> ReferenceEmbedding {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        // Spectral summary stand-in: fold byte windows into fixed bins.
        for (i, chunk) in audio.chunks(257).enumerate() {
            let sum: u64 = chunk.iter().map(|&b| b as u64).sum();
            let bin = i % EMBEDDING_DIM;
            values[bin] += (sum % 1000) as f32 / 1000.0 - 0.5;
        }
        let mut hasher = DefaultHasher::new();
        transcript.hash(&mut hasher);
        let h = hasher.finish();
        for (i, v) in values.iter_mut().enumerate() {
            *v += ((h >> (i % 56)) & 0xFF) as f32 / 512.0 - 0.25;
        }
        ReferenceEmbedding { values }
    }

    /// Generate audio for an utterance using the given voice model.
    ///
    /// The caller must hold an admission ticket for the duration of
    /// this call.
    #[instrument(skip_all, fields(voice_id = model.voice_id(), tokens = utterance.len()))]
    pub async fn synthesize(
        &self,
        model: &ModelHandle,
        utterance: &NormalizedUtterance,
        reference: Option<&ReferenceEmbedding>,
        options: &GenerationOptions,
    ) -> SynthResult<AudioBuffer> {
        if !(0.5..=2.0).contains(&options.speed) {
            return Err(SynthError::malformed(format!(
                "speed {} outside 0.5..=2.0",
                options.speed
            )));
        }

        let mut sample_rate = model.sample_rate();
        if sample_rate == 0 {
            sample_rate = self.fallback_sample_rate;
        }

        let tokens = utterance.tokens().to_vec();
        let mut speaker: Vec<f32> = model.embedding().to_vec();
        if let Some(reference) = reference {
            speaker = blend(&speaker, &reference.values);
        }
        let seed = options.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let speed = options.speed;

        let started = Instant::now();
        let generation = tokio::task::spawn_blocking(move || {
            render_waveform(&tokens, &speaker, sample_rate, speed, seed)
        });

        let samples = match tokio::time::timeout(self.timeout, generation).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                return Err(SynthError::inference(format!("generation panicked: {e}")));
            }
            Err(_) => {
                return Err(SynthError::inference(format!(
                    "generation exceeded {:?}",
                    self.timeout
                )));
            }
        };

        let audio = AudioBuffer::mono(samples, sample_rate);
        debug!(
            duration_ms = audio.duration_ms() as u64,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesis complete"
        );
        Ok(audio)
    }
}

/// Blend speaker identity with a reference conditioning vector.
fn blend(speaker: &[f32], reference: &[f32]) -> Vec<f32> {
    let len = speaker.len().max(reference.len()).max(1);
    (0..len)
        .map(|i| {
            let s = speaker.get(i).copied().unwrap_or(0.0);
            let r = reference.get(i).copied().unwrap_or(0.0);
            0.4 * s + 0.6 * r
        })
        .collect()
}

/// Produce PCM for a token sequence.
///
/// Each token becomes a pitched segment whose fundamental comes from
/// the token identity and the speaker vector, with seeded jitter so a
/// fixed seed reproduces the same waveform.
fn render_waveform(
    tokens: &[String],
    speaker: &[f32],
    sample_rate: u32,
    speed: f32,
    seed: u64,
) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let speaker_mean = if speaker.is_empty() {
        0.0
    } else {
        speaker.iter().sum::<f32>() / speaker.len() as f32
    };
    let base_pitch = 110.0 + 80.0 * (speaker_mean.tanh() + 1.0);

    let token_samples =
        ((TOKEN_DURATION_MS as f32 / speed) * sample_rate as f32 / 1000.0) as usize;
    let mut samples = Vec::with_capacity(tokens.len() * token_samples);

    for token in tokens {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let token_hash = hasher.finish();

        let pitch = base_pitch * (1.0 + ((token_hash % 24) as f32 - 12.0) / 48.0);
        let jitter: f32 = rng.gen_range(-0.02..0.02);
        let freq = pitch * (1.0 + jitter);

        for n in 0..token_samples {
            let t = n as f32 / sample_rate as f32;
            // Fundamental plus one overtone, with an attack/decay ramp.
            let envelope = attack_decay(n, token_samples);
            let value = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.6
                + (4.0 * std::f32::consts::PI * freq * t).sin() * 0.2;
            samples.push(value * envelope * 0.5);
        }
    }

    samples
}

fn attack_decay(n: usize, total: usize) -> f32 {
    let ramp = (total / 8).max(1);
    if n < ramp {
        n as f32 / ramp as f32
    } else if n > total.saturating_sub(ramp) {
        (total - n) as f32 / ramp as f32
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxserve_core::Locale;

    fn utterance(words: &[&str]) -> NormalizedUtterance {
        NormalizedUtterance::new(words.iter().map(|w| w.to_string()).collect(), Locale::En)
    }

    #[test]
    fn test_render_is_deterministic_with_seed() {
        let tokens: Vec<String> = vec!["hello".into(), "world".into()];
        let speaker = vec![0.1, -0.2, 0.3];

        let a = render_waveform(&tokens, &speaker, 24000, 1.0, 42);
        let b = render_waveform(&tokens, &speaker, 24000, 1.0, 42);
        assert_eq!(a, b);

        let c = render_waveform(&tokens, &speaker, 24000, 1.0, 43);
        assert_ne!(a, c);
    }

    #[test]
    fn test_speed_scales_duration() {
        let tokens: Vec<String> = vec!["one".into()];
        let slow = render_waveform(&tokens, &[], 24000, 0.5, 1);
        let fast = render_waveform(&tokens, &[], 24000, 2.0, 1);
        assert!(slow.len() > 3 * fast.len());
    }

    #[test]
    fn test_samples_are_bounded() {
        let tokens: Vec<String> = vec!["loud".into(), "noise".into()];
        let samples = render_waveform(&tokens, &[5.0, 5.0], 16000, 1.0, 7);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_reference_embedding_fixed_dim() {
        let engine = InferenceEngine::new(&InferenceConfig::default());
        let emb = engine.embed_reference(&[1, 2, 3, 4], "hello there");
        assert_eq!(emb.dim(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_synthesize_rejects_bad_speed() {
        use crate::models::ModelManager;
        use std::sync::Arc;

        let manager = ModelManager::new(
            Arc::new(crate::models::tests::StubLoader::new(&["alloy"])),
            4,
        );
        let handle = manager.resolve("alloy").await.unwrap();

        let engine = InferenceEngine::new(&InferenceConfig::default());
        let err = engine
            .synthesize(
                &handle,
                &utterance(&["hi"]),
                None,
                &GenerationOptions {
                    speed: 3.0,
                    seed: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MalformedInput");
    }

    #[tokio::test]
    async fn test_synthesize_produces_audio() {
        use crate::models::ModelManager;
        use std::sync::Arc;

        let manager = ModelManager::new(
            Arc::new(crate::models::tests::StubLoader::new(&["alloy"])),
            4,
        );
        let handle = manager.resolve("alloy").await.unwrap();

        let engine = InferenceEngine::new(&InferenceConfig::default());
        let audio = engine
            .synthesize(
                &handle,
                &utterance(&["hello", "world"]),
                None,
                &GenerationOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(audio.sample_rate, 24000);
        assert!(audio.duration_ms() > 100.0);
    }
}
