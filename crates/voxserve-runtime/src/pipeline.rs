//! Request pipeline.
//!
//! Drives one synthesis request through admission, normalization, the
//! optional recognition step, model resolution, generation, and
//! encoding. The admission ticket is held across generation and
//! encoding and released by RAII on every exit path, including client
//! disconnects that drop the request future mid-flight.

use std::sync::Arc;

use tracing::{info, instrument};
use voxserve_core::{
    Encoder, NormalizedUtterance, OutputFormat, SynthError, SynthResult, SynthesisRequest,
    TextFrontend, Transcriber, VoiceSource,
};

use crate::engine::{GenerationOptions, InferenceEngine, ReferenceEmbedding};
use crate::models::{ModelHandle, ModelManager};
use crate::scheduler::{AdmissionScheduler, SchedulerSnapshot};

/// Encoded output of a completed request.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    /// Encoded file bytes.
    pub bytes: Vec<u8>,
    /// Container the bytes are in.
    pub format: OutputFormat,
    /// Duration of the clip in milliseconds.
    pub duration_ms: f32,
}

/// Health view over the pipeline's shared state.
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    /// Scheduler state.
    pub scheduler: SchedulerSnapshot,
    /// Models currently resident and ready.
    pub resident_models: usize,
}

impl HealthSnapshot {
    /// Ready to accept traffic: some capacity exists.
    pub fn is_ready(&self) -> bool {
        self.scheduler.capacity > 0
    }
}

/// Orchestrates the synthesis components for the gateway.
pub struct SynthesisPipeline {
    scheduler: Arc<AdmissionScheduler>,
    frontend: Arc<dyn TextFrontend>,
    transcriber: Arc<dyn Transcriber>,
    models: Arc<ModelManager>,
    engine: InferenceEngine,
    encoder: Arc<dyn Encoder>,
    clone_voice: String,
}

impl SynthesisPipeline {
    /// Assemble a pipeline from its components.
    pub fn new(
        scheduler: Arc<AdmissionScheduler>,
        frontend: Arc<dyn TextFrontend>,
        transcriber: Arc<dyn Transcriber>,
        models: Arc<ModelManager>,
        engine: InferenceEngine,
        encoder: Arc<dyn Encoder>,
        clone_voice: String,
    ) -> Self {
        Self {
            scheduler,
            frontend,
            transcriber,
            models,
            engine,
            encoder,
            clone_voice,
        }
    }

    /// Run one request through the whole pipeline.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, format = request.format.extension()))]
    pub async fn process(&self, request: &SynthesisRequest) -> SynthResult<EncodedAudio> {
        // One unit per request: the device budget is sized in requests.
        let mut ticket = self.scheduler.acquire(1).await?;

        let utterance = self.frontend.normalize(&request.text, request.locale)?;
        let (handle, reference) = self.resolve_voice(request).await?;

        let options = GenerationOptions {
            speed: request.speed,
            seed: request.seed,
        };
        let audio = self
            .engine
            .synthesize(&handle, &utterance, reference.as_ref(), &options)
            .await?;
        drop(handle);

        let bytes = self.encoder.encode(&audio, request.format).await?;
        ticket.release();

        info!(
            encoded_bytes = bytes.len(),
            duration_ms = audio.duration_ms() as u64,
            "request complete"
        );
        Ok(EncodedAudio {
            bytes,
            format: request.format,
            duration_ms: audio.duration_ms(),
        })
    }

    /// Resolve the request's voice source to a model and optional
    /// cloning embedding.
    async fn resolve_voice(
        &self,
        request: &SynthesisRequest,
    ) -> SynthResult<(ModelHandle, Option<ReferenceEmbedding>)> {
        match &request.source {
            VoiceSource::VoiceId(voice_id) => {
                let handle = self.models.resolve(voice_id).await?;
                Ok((handle, None))
            }
            VoiceSource::Reference { audio, transcript } => {
                if audio.is_empty() {
                    return Err(SynthError::malformed("reference audio is empty"));
                }
                let transcript = match transcript {
                    Some(text) => text.clone(),
                    None => self.transcriber.transcribe(audio).await?,
                };
                let embedding = self.engine.embed_reference(audio, &transcript);
                let handle = self.models.resolve(&self.clone_voice).await?;
                Ok((handle, Some(embedding)))
            }
        }
    }

    /// Normalize without synthesizing, for diagnostics.
    pub fn preview_normalization(
        &self,
        text: &str,
        locale: voxserve_core::Locale,
    ) -> SynthResult<NormalizedUtterance> {
        self.frontend.normalize(text, locale)
    }

    /// Voices available in the catalog.
    pub async fn voices(&self) -> SynthResult<Vec<String>> {
        self.models.list_voices().await
    }

    /// Current health view.
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            scheduler: self.scheduler.snapshot(),
            resident_models: self.models.resident_count(),
        }
    }
}
