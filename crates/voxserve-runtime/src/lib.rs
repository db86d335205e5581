//! # voxserve-runtime
//!
//! Runtime orchestration for the voxserve speech-synthesis server.
//!
//! This crate provides:
//! - Admission scheduling with bounded waiting and backpressure
//! - Voice model lifecycle (lazy single-flight loading, LRU eviction)
//! - The inference engine and reference-audio embedding
//! - The ASR bridge for transcript recovery
//! - Audio post-processing through an external encoder
//! - The pipeline that wires these together for the gateway

pub mod asr;
pub mod device;
pub mod encoder;
pub mod engine;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod scheduler;

pub use asr::AsrBridge;
pub use encoder::{CannedEncoder, FfmpegEncoder};
pub use engine::{GenerationOptions, InferenceEngine, ReferenceEmbedding};
pub use models::{FsLoader, ModelHandle, ModelLoader, ModelManager, VoiceModel};
pub use pipeline::{EncodedAudio, HealthSnapshot, SynthesisPipeline};
pub use scheduler::{AdmissionScheduler, AdmissionTicket, SchedulerSnapshot};
