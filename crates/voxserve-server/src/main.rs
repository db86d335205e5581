//! voxserve gateway binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voxserve_core::config::DeviceType;
use voxserve_core::AppConfig;
use voxserve_frontend::Normalizer;
use voxserve_runtime::{
    device, logging, AdmissionScheduler, AsrBridge, FfmpegEncoder, FsLoader, InferenceEngine,
    ModelManager, SynthesisPipeline,
};
use voxserve_server::GatewayServer;

/// voxserve speech-synthesis gateway
#[derive(Debug, Parser)]
#[command(name = "voxserve-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Voice model catalog directory
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Compute device (cpu, cuda, metal)
    #[arg(long)]
    device: Option<String>,

    /// GPU index when several devices are present
    #[arg(long)]
    gpu_index: Option<usize>,

    /// External recognition endpoint
    #[arg(long, env = "ASR_ENDPOINT")]
    asr_endpoint: Option<String>,

    /// Concurrent synthesis slots
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Path to the external audio encoder
    #[arg(long)]
    ffmpeg_path: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn build_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => AppConfig::default(),
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.model_dir {
            config.models.dir = dir.clone();
        }
        if let Some(device) = &self.device {
            config.models.device.device_type = match device.to_lowercase().as_str() {
                "cuda" | "gpu" | "nvidia" => DeviceType::Cuda,
                "metal" | "mps" => DeviceType::Metal,
                _ => DeviceType::Cpu,
            };
        }
        if let Some(index) = self.gpu_index {
            config.models.device.gpu_index = Some(index);
        }
        if let Some(endpoint) = &self.asr_endpoint {
            config.asr.endpoint = Some(endpoint.clone());
        }
        if let Some(max) = self.max_concurrent {
            config.scheduler.max_concurrent = max;
        }
        if let Some(path) = &self.ffmpeg_path {
            config.encoder.ffmpeg_path = path.clone();
        }
        config.logging.level = self.log_level.clone();
        config.logging.format = if self.json_logs { "json" } else { "text" }.to_string();

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.build_config()?;
    config.validate().context("invalid configuration")?;

    logging::init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.bind_addr(),
        model_dir = %config.models.dir.display(),
        "starting voxserve gateway"
    );

    let selected = device::select_device(&config.models.device).context("select device")?;
    info!(device = device::device_name(&selected), "device selected");

    let loader = Arc::new(FsLoader::new(config.models.dir.clone(), selected));
    let models = Arc::new(ModelManager::new(loader, config.models.max_resident));
    let scheduler = Arc::new(AdmissionScheduler::new(&config.scheduler));
    let transcriber = Arc::new(AsrBridge::new(&config.asr).context("asr client")?);
    let encoder = Arc::new(FfmpegEncoder::new(&config.encoder));
    let engine = InferenceEngine::new(&config.inference);

    let pipeline = Arc::new(SynthesisPipeline::new(
        scheduler,
        Arc::new(Normalizer::new()),
        transcriber,
        models,
        engine,
        encoder,
        config.models.clone_voice.clone(),
    ));

    let server = GatewayServer::new(config.server.clone(), pipeline);
    server.run().await.context("gateway failed")?;

    info!("gateway shutdown complete");
    Ok(())
}
