//! Audio post-processing.
//!
//! WAV output is written in-process; every other container shells out
//! to an external encoder reading PCM on stdin and writing the encoded
//! stream to stdout. A nonzero exit is `EncodingError` with the tail
//! of stderr attached.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use voxserve_core::{AudioBuffer, Encoder, EncoderConfig, OutputFormat, SynthError, SynthResult};

/// Bytes of stderr preserved in error messages.
const STDERR_TAIL: usize = 256;

/// Encoder backed by an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    /// Create an encoder from configuration.
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: Duration::from_millis(config.encode_timeout_ms),
        }
    }

    async fn run_tool(&self, audio: &AudioBuffer, format: OutputFormat) -> SynthResult<Vec<u8>> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "s16le"])
            .args(["-ar", &audio.sample_rate.to_string()])
            .args(["-ac", &audio.channels.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-f", format.muxer()])
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SynthError::encoding(format!("spawn {:?}: {e}", self.ffmpeg_path)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthError::encoding("encoder stdin unavailable"))?;
        let pcm = audio.to_pcm_s16le();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&pcm).await;
            // Closing stdin signals end of input.
            drop(stdin);
        });

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| SynthError::encoding(format!("encoder wait: {e}")))?
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "encoder timed out");
                return Err(SynthError::encoding(format!(
                    "encoder exceeded {:?}",
                    self.timeout
                )));
            }
        };
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(SynthError::encoding(format!(
                "encoder exited with {}: {}",
                output.status,
                tail.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    #[instrument(skip(self, audio), fields(format = format.extension(), frames = audio.frames()))]
    async fn encode(&self, audio: &AudioBuffer, format: OutputFormat) -> SynthResult<Vec<u8>> {
        // WAV needs no external tool.
        if format == OutputFormat::Wav {
            return audio.to_wav_bytes();
        }

        let bytes = self.run_tool(audio, format).await?;
        if bytes.is_empty() {
            return Err(SynthError::encoding("encoder produced no output"));
        }
        debug!(encoded_bytes = bytes.len(), "encode complete");
        Ok(bytes)
    }
}

/// Test double returning fixed bytes for any input.
#[derive(Debug, Clone)]
pub struct CannedEncoder {
    bytes: Vec<u8>,
    fail: bool,
}

impl CannedEncoder {
    /// An encoder that always succeeds with the given bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, fail: false }
    }

    /// An encoder that always fails with `EncodingError`.
    pub fn failing() -> Self {
        Self {
            bytes: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Encoder for CannedEncoder {
    async fn encode(&self, _audio: &AudioBuffer, _format: OutputFormat) -> SynthResult<Vec<u8>> {
        if self.fail {
            return Err(SynthError::encoding("canned failure"));
        }
        Ok(self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone() -> AudioBuffer {
        let samples: Vec<f32> = (0..1600)
            .map(|n| (2.0 * std::f32::consts::PI * 440.0 * n as f32 / 16000.0).sin() * 0.5)
            .collect();
        AudioBuffer::mono(samples, 16000)
    }

    #[tokio::test]
    async fn test_wav_short_circuits_subprocess() {
        // A bogus binary path proves WAV never shells out.
        let encoder = FfmpegEncoder::new(&EncoderConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            encode_timeout_ms: 1_000,
        });

        let bytes = encoder.encode(&tone(), OutputFormat::Wav).await.unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
    }

    #[tokio::test]
    async fn test_missing_binary_is_encoding_error() {
        let encoder = FfmpegEncoder::new(&EncoderConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            encode_timeout_ms: 1_000,
        });

        let err = encoder.encode(&tone(), OutputFormat::Mp3).await.unwrap_err();
        assert_eq!(err.code(), "EncodingError");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_encoding_error() {
        // `false` ignores our arguments and exits 1 without output.
        let encoder = FfmpegEncoder::new(&EncoderConfig {
            ffmpeg_path: PathBuf::from("false"),
            encode_timeout_ms: 2_000,
        });

        let err = encoder.encode(&tone(), OutputFormat::Mp3).await.unwrap_err();
        assert_eq!(err.code(), "EncodingError");
    }

    #[tokio::test]
    async fn test_canned_encoder() {
        let encoder = CannedEncoder::new(vec![1, 2, 3]);
        let bytes = encoder.encode(&tone(), OutputFormat::Mp3).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let err = CannedEncoder::failing()
            .encode(&tone(), OutputFormat::Mp3)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EncodingError");
    }
}
