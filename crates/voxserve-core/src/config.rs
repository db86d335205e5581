//! Configuration structures for the synthesis server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SynthError, SynthResult};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP gateway settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Model catalog settings.
    #[serde(default)]
    pub models: ModelDirConfig,

    /// Admission scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// ASR bridge settings.
    #[serde(default)]
    pub asr: AsrConfig,

    /// Audio post-processor settings.
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Inference engine settings.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> SynthResult<()> {
        if self.scheduler.max_concurrent == 0 {
            return Err(SynthError::config("scheduler.max_concurrent must be > 0"));
        }
        if self.scheduler.admission_timeout_ms == 0 {
            return Err(SynthError::config(
                "scheduler.admission_timeout_ms must be > 0",
            ));
        }
        if self.inference.generation_timeout_secs == 0 {
            return Err(SynthError::config(
                "inference.generation_timeout_secs must be > 0",
            ));
        }
        if self.asr.max_payload_bytes == 0 {
            return Err(SynthError::config("asr.max_payload_bytes must be > 0"));
        }
        Ok(())
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Request body size limit in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Seconds to wait for in-flight requests during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_max_body_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_body_size: default_max_body_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDirConfig {
    /// Directory holding one subdirectory per voice.
    #[serde(default = "default_model_dir")]
    pub dir: PathBuf,
    /// Maximum number of resident models; least-recently-used idle
    /// models are evicted beyond this.
    #[serde(default = "default_max_resident")]
    pub max_resident: usize,
    /// Voice id of the cloning-capable base model used for
    /// reference-audio requests.
    #[serde(default = "default_clone_voice")]
    pub clone_voice: String,
    /// Compute device settings.
    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_max_resident() -> usize {
    4
}

fn default_clone_voice() -> String {
    "base".to_string()
}

impl Default for ModelDirConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            max_resident: default_max_resident(),
            clone_voice: default_clone_voice(),
            device: DeviceConfig::default(),
        }
    }
}

/// Compute device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Preferred device type.
    #[serde(default)]
    pub device_type: DeviceType,
    /// Specific GPU device index (if using CUDA).
    pub gpu_index: Option<usize>,
}

/// Device type for computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CPU computation.
    #[default]
    Cpu,
    /// CUDA GPU computation.
    Cuda,
    /// Metal GPU computation (Apple).
    Metal,
}

/// Admission scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent synthesis slots.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum requests allowed to wait for a slot.
    #[serde(default = "default_max_waiting")]
    pub max_waiting: usize,
    /// How long a request may wait for a slot before rejection.
    #[serde(default = "default_admission_timeout_ms")]
    pub admission_timeout_ms: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_waiting() -> usize {
    32
}

fn default_admission_timeout_ms() -> u64 {
    10_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_waiting: default_max_waiting(),
            admission_timeout_ms: default_admission_timeout_ms(),
        }
    }
}

/// ASR bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    /// Recognition endpoint URL. Unset disables transcript recovery;
    /// cloning requests without a transcript then fail fast.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_asr_timeout_ms")]
    pub timeout_ms: u64,
    /// Reference audio size cap in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Number of retries after a failed call.
    #[serde(default = "default_asr_retries")]
    pub retries: u32,
}

fn default_asr_timeout_ms() -> u64 {
    15_000
}

fn default_max_payload_bytes() -> usize {
    8 * 1024 * 1024 // 8 MB
}

fn default_asr_retries() -> u32 {
    1
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_asr_timeout_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            retries: default_asr_retries(),
        }
    }
}

/// Audio post-processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// External encoder binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Per-encode timeout in milliseconds.
    #[serde(default = "default_encode_timeout_ms")]
    pub encode_timeout_ms: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_encode_timeout_ms() -> u64 {
    30_000
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            encode_timeout_ms: default_encode_timeout_ms(),
        }
    }
}

/// Inference engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Hard cap on a single generation, in seconds.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_generation_timeout_secs() -> u64 {
    300
}

fn default_sample_rate() -> u32 {
    24000
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: default_generation_timeout_secs(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json or text).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
