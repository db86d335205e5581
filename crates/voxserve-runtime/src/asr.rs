//! Bridge to the external speech-recognition service.
//!
//! The endpoint is an untrusted network dependency: calls carry a
//! bounded timeout, at most the configured number of retries with
//! backoff, and a payload size cap enforced before any bytes leave the
//! process.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use voxserve_core::{AsrConfig, SynthError, SynthResult, Transcriber};

/// Response body of the recognition endpoint.
#[derive(Debug, Deserialize)]
struct AsrResponse {
    text: String,
}

/// HTTP client for the recognition endpoint.
#[derive(Debug, Clone)]
pub struct AsrBridge {
    client: reqwest::Client,
    endpoint: Option<String>,
    max_payload_bytes: usize,
    retries: u32,
}

impl AsrBridge {
    /// Create a bridge from configuration.
    pub fn new(config: &AsrConfig) -> SynthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SynthError::config(format!("asr client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_payload_bytes: config.max_payload_bytes,
            retries: config.retries,
        })
    }

    async fn call(&self, endpoint: &str, audio: Vec<u8>) -> Result<String, String> {
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("endpoint returned {status}"));
        }

        let body: AsrResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {e}"))?;
        Ok(body.text)
    }
}

#[async_trait]
impl Transcriber for AsrBridge {
    #[instrument(skip_all, fields(payload_bytes = audio.len()))]
    async fn transcribe(&self, audio: &[u8]) -> SynthResult<String> {
        if audio.len() > self.max_payload_bytes {
            return Err(SynthError::PayloadTooLarge {
                size: audio.len(),
                limit: self.max_payload_bytes,
            });
        }

        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(SynthError::AsrUnavailable(
                "no recognition endpoint configured".to_string(),
            ));
        };

        let mut last_error = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(250 * attempt as u64);
                debug!(attempt, ?backoff, "retrying recognition call");
                tokio::time::sleep(backoff).await;
            }

            match self.call(endpoint, audio.to_vec()).await {
                Ok(text) => {
                    debug!(attempt, transcript_len = text.len(), "recognition succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "recognition call failed");
                    last_error = e;
                }
            }
        }

        Err(SynthError::AsrUnavailable(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(endpoint: &str, max_payload: usize) -> AsrBridge {
        AsrBridge::new(&AsrConfig {
            endpoint: Some(endpoint.to_string()),
            timeout_ms: 500,
            max_payload_bytes: max_payload,
            retries: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unset_endpoint_fails_fast() {
        let bridge = AsrBridge::new(&AsrConfig::default()).unwrap();

        let started = std::time::Instant::now();
        let err = bridge.transcribe(&[0u8; 4]).await.unwrap_err();
        assert_eq!(err.code(), "AsrUnavailable");
        // No network call, no retries, no backoff.
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_oversized_payload_fails_fast() {
        let bridge = bridge("http://127.0.0.1:1/recognize", 8);
        let err = bridge.transcribe(&[0u8; 16]).await.unwrap_err();
        assert_eq!(err.code(), "PayloadTooLarge");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        // Port 1 is never listening; connection fails within the timeout.
        let bridge = bridge("http://127.0.0.1:1/recognize", 1024);

        let started = std::time::Instant::now();
        let err = bridge.transcribe(&[0u8; 16]).await.unwrap_err();
        assert_eq!(err.code(), "AsrUnavailable");
        // Two attempts, 500ms timeout each, plus one 250ms backoff.
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_error_is_retryable() {
        let bridge = bridge("http://127.0.0.1:1/recognize", 1024);
        let err = bridge.transcribe(&[0u8; 4]).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
