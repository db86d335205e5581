//! # voxserve-core
//!
//! Core types, traits, and error definitions for the voxserve
//! speech-synthesis server.
//!
//! This crate provides the foundational abstractions used across all other
//! crates in the workspace, including:
//!
//! - Common data types (`SynthesisRequest`, `NormalizedUtterance`,
//!   `AudioBuffer`, etc.)
//! - Capability traits for pipeline components (`TextFrontend`,
//!   `Transcriber`, `Encoder`)
//! - Unified error handling via `SynthError` with stable external codes
//! - Configuration structures injected by the gateway binary

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, AsrConfig, EncoderConfig, InferenceConfig, LoggingConfig, ModelDirConfig,
    SchedulerConfig, ServerConfig,
};
pub use error::{SynthError, SynthResult};
pub use traits::{Encoder, TextFrontend, Transcriber};
pub use types::{
    AudioBuffer, Locale, NormalizedUtterance, OutputFormat, SynthesisRequest, VoiceSource,
};
