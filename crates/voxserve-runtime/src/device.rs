//! Compute device selection.
//!
//! Maps the configured device preference onto a candle device, with
//! CPU as the universal fallback. One process drives one device; the
//! GPU index picks which card when several are present.

use candle_core::Device;
use tracing::{info, warn};
use voxserve_core::config::{DeviceConfig, DeviceType};
use voxserve_core::{SynthError, SynthResult};

/// Select the device described by the configuration.
pub fn select_device(config: &DeviceConfig) -> SynthResult<Device> {
    let index = config.gpu_index.unwrap_or(0);
    match config.device_type {
        DeviceType::Cpu => {
            info!("using CPU device");
            Ok(Device::Cpu)
        }
        DeviceType::Cuda => select_cuda(index),
        DeviceType::Metal => select_metal(index),
    }
}

#[allow(unused_variables)]
fn select_cuda(index: usize) -> SynthResult<Device> {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(index) {
            Ok(device) => {
                info!(index, "using CUDA device");
                Ok(device)
            }
            Err(e) => Err(SynthError::config(format!(
                "CUDA device {index} requested but not available: {e}"
            ))),
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        warn!("CUDA requested without the 'cuda' feature, falling back to CPU");
        Ok(Device::Cpu)
    }
}

#[allow(unused_variables)]
fn select_metal(index: usize) -> SynthResult<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(index) {
            Ok(device) => {
                info!(index, "using Metal device");
                Ok(device)
            }
            Err(e) => Err(SynthError::config(format!(
                "Metal device {index} requested but not available: {e}"
            ))),
        }
    }

    #[cfg(not(feature = "metal"))]
    {
        warn!("Metal requested without the 'metal' feature, falling back to CPU");
        Ok(Device::Cpu)
    }
}

/// Device name for logging and health reporting.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
