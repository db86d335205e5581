//! HTTP gateway for the synthesis pipeline.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use voxserve_core::{
    Locale, OutputFormat, ServerConfig, SynthError, SynthResult, SynthesisRequest, VoiceSource,
};
use voxserve_runtime::SynthesisPipeline;

/// Chunk size for streamed responses.
const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// Shared gateway state.
struct AppState {
    pipeline: Arc<SynthesisPipeline>,
    start_time: Instant,
}

/// Synthesis request body.
#[derive(Debug, Deserialize)]
struct SynthesizeBody {
    text: String,
    /// Catalog voice id. Mutually exclusive with `reference_audio`.
    #[serde(default)]
    voice: Option<String>,
    /// Base64-encoded reference clip for cloning.
    #[serde(default)]
    reference_audio: Option<String>,
    /// Transcript of the reference clip; recognized remotely when absent.
    #[serde(default)]
    reference_transcript: Option<String>,
    #[serde(default)]
    format: OutputFormat,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default = "default_speed")]
    speed: f32,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    stream: bool,
}

fn default_speed() -> f32 {
    1.0
}

impl SynthesizeBody {
    fn into_request(self) -> SynthResult<SynthesisRequest> {
        let locale = match &self.locale {
            Some(s) => s.parse::<Locale>()?,
            None => Locale::default(),
        };

        let source = match (self.voice, self.reference_audio) {
            (Some(voice), None) => VoiceSource::VoiceId(voice),
            (None, Some(encoded)) => {
                let audio = base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| SynthError::malformed(format!("reference_audio: {e}")))?;
                VoiceSource::Reference {
                    audio,
                    transcript: self.reference_transcript,
                }
            }
            (Some(_), Some(_)) => {
                return Err(SynthError::malformed(
                    "voice and reference_audio are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(SynthError::malformed(
                    "one of voice or reference_audio is required",
                ));
            }
        };

        if !(0.5..=2.0).contains(&self.speed) {
            return Err(SynthError::malformed(format!(
                "speed {} outside 0.5..=2.0",
                self.speed
            )));
        }

        Ok(SynthesisRequest {
            request_id: uuid::Uuid::new_v4(),
            text: self.text,
            locale,
            source,
            format: self.format,
            stream: self.stream,
            speed: self.speed,
            seed: self.seed,
        })
    }
}

/// Normalization preview body.
#[derive(Debug, Deserialize)]
struct NormalizeBody {
    text: String,
    #[serde(default)]
    locale: Option<String>,
}

/// Normalization preview response.
#[derive(Serialize)]
struct NormalizeResponse {
    locale: String,
    tokens: Vec<String>,
}

/// Structured error body; the only shape errors take on the wire.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// A pipeline error paired with its HTTP status.
#[derive(Debug)]
struct ApiError(SynthError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SynthError::MalformedInput(_) | SynthError::UnsupportedLocale(_) => {
                StatusCode::BAD_REQUEST
            }
            SynthError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            SynthError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            SynthError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            SynthError::AsrUnavailable(_) => StatusCode::BAD_GATEWAY,
            SynthError::ModelLoad { .. }
            | SynthError::Inference(_)
            | SynthError::Encoding(_)
            | SynthError::Config(_)
            | SynthError::Io(_)
            | SynthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SynthError> for ApiError {
    fn from(err: SynthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    capacity: usize,
    available: usize,
    waiting: usize,
    resident_models: usize,
}

/// Voice listing response.
#[derive(Serialize)]
struct VoicesResponse {
    voices: Vec<String>,
}

/// The gateway server.
pub struct GatewayServer {
    config: ServerConfig,
    pipeline: Arc<SynthesisPipeline>,
}

impl GatewayServer {
    /// Create a server over an assembled pipeline.
    pub fn new(config: ServerConfig, pipeline: Arc<SynthesisPipeline>) -> Self {
        Self { config, pipeline }
    }

    /// Build the router; split out for tests.
    pub(crate) fn router(pipeline: Arc<SynthesisPipeline>, max_body_size: usize) -> Router {
        let state = Arc::new(AppState {
            pipeline,
            start_time: Instant::now(),
        });

        Router::new()
            .route("/synthesize", post(synthesize_handler))
            .route("/normalize", post(normalize_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/voices", get(voices_handler))
            .layer(DefaultBodyLimit::max(max_body_size))
            .with_state(state)
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(self) -> SynthResult<()> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let app = Self::router(Arc::clone(&self.pipeline), self.config.max_body_size);
        let addr = self.config.bind_addr();

        let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
        info!(%addr, "gateway listening");

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                })
                .await
        });

        shutdown_signal().await;
        info!("shutdown signal received, draining requests");
        let _ = shutdown_tx.send(true);

        let grace = std::time::Duration::from_secs(self.config.shutdown_grace_secs);
        tokio::select! {
            _ = tokio::time::sleep(grace) => {
                warn!("shutdown grace period elapsed, forcing exit");
            }
            result = server => {
                match result {
                    Ok(Ok(())) => info!("gateway stopped"),
                    Ok(Err(e)) => return Err(SynthError::Io(e)),
                    Err(e) => return Err(SynthError::internal(format!("server task: {e}"))),
                }
            }
        }

        Ok(())
    }
}

/// Synthesis endpoint.
async fn synthesize_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SynthesizeBody>,
) -> Result<Response, ApiError> {
    let request = body.into_request()?;
    let request_id = request.request_id;

    let encoded = state.pipeline.process(&request).await?;

    let mut response = if request.stream {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = encoded
            .bytes
            .chunks(STREAM_CHUNK_BYTES)
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        Response::new(Body::from_stream(tokio_stream::iter(chunks)))
    } else {
        Response::new(Body::from(encoded.bytes))
    };

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(encoded.format.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert("x-request-id", value);
    }
    Ok(response)
}

/// Normalization preview endpoint: runs the text frontend without
/// touching the scheduler or any model, for diagnostics.
async fn normalize_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NormalizeBody>,
) -> Result<Json<NormalizeResponse>, ApiError> {
    let locale = match &body.locale {
        Some(s) => s.parse::<Locale>()?,
        None => Locale::default(),
    };
    let utterance = state.pipeline.preview_normalization(&body.text, locale)?;
    Ok(Json(NormalizeResponse {
        locale: utterance.locale().to_string(),
        tokens: utterance.into_tokens(),
    }))
}

/// Health endpoint reflecting scheduler and model manager state.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.pipeline.health();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        capacity: health.scheduler.capacity,
        available: health.scheduler.available,
        waiting: health.scheduler.waiting,
        resident_models: health.resident_models,
    })
}

/// Readiness endpoint.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.pipeline.health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Catalog listing endpoint.
async fn voices_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VoicesResponse>, ApiError> {
    let voices = state.pipeline.voices().await?;
    Ok(Json(VoicesResponse { voices }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(json: &str) -> SynthesizeBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_body_requires_exactly_one_source() {
        let err = body_json(r#"{"text": "hi"}"#).into_request().unwrap_err();
        assert_eq!(err.code(), "MalformedInput");

        let err = body_json(r#"{"text": "hi", "voice": "a", "reference_audio": "AAAA"}"#)
            .into_request()
            .unwrap_err();
        assert_eq!(err.code(), "MalformedInput");

        let req = body_json(r#"{"text": "hi", "voice": "a"}"#)
            .into_request()
            .unwrap();
        assert!(matches!(req.source, VoiceSource::VoiceId(ref v) if v == "a"));
    }

    #[test]
    fn test_body_decodes_reference_audio() {
        let req = body_json(r#"{"text": "hi", "reference_audio": "AQID"}"#)
            .into_request()
            .unwrap();
        match req.source {
            VoiceSource::Reference { audio, transcript } => {
                assert_eq!(audio, vec![1, 2, 3]);
                assert!(transcript.is_none());
            }
            _ => panic!("expected reference source"),
        }

        let err = body_json(r#"{"text": "hi", "reference_audio": "not base64!!"}"#)
            .into_request()
            .unwrap_err();
        assert_eq!(err.code(), "MalformedInput");
    }

    #[test]
    fn test_body_validates_speed_and_locale() {
        let err = body_json(r#"{"text": "hi", "voice": "a", "speed": 5.0}"#)
            .into_request()
            .unwrap_err();
        assert_eq!(err.code(), "MalformedInput");

        let err = body_json(r#"{"text": "hi", "voice": "a", "locale": "fr"}"#)
            .into_request()
            .unwrap_err();
        assert_eq!(err.code(), "UnsupportedLocale");

        let req = body_json(r#"{"text": "hi", "voice": "a", "locale": "zh"}"#)
            .into_request()
            .unwrap();
        assert_eq!(req.locale, Locale::Zh);
    }

    #[test]
    fn test_body_defaults() {
        let req = body_json(r#"{"text": "hi", "voice": "a"}"#)
            .into_request()
            .unwrap();
        assert_eq!(req.format, OutputFormat::Wav);
        assert_eq!(req.locale, Locale::En);
        assert_eq!(req.speed, 1.0);
        assert!(!req.stream);
        assert!(req.seed.is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let cases: [(SynthError, StatusCode); 7] = [
            (SynthError::malformed("x"), StatusCode::BAD_REQUEST),
            (
                SynthError::UnsupportedLocale("xx".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                SynthError::ModelNotFound("v".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                SynthError::PayloadTooLarge { size: 2, limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                SynthError::Overloaded("full".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                SynthError::AsrUnavailable("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                SynthError::inference("oom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
