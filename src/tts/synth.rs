//! Adapter for the external speech-synthesis capability.
//!
//! The backend is a black box that takes SSML and returns LINEAR16 WAV bytes
//! plus chunk-local mark offsets. Timing must be requested explicitly; the
//! backend returns no timepoints otherwise.

use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use thiserror::Error;

/// Retry budget for transport-level failures, per chunk.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff; doubles per attempt.
const BACKOFF_MS: u64 = 250;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Request(String),
    #[error("synthesis backend returned error: {0}")]
    Backend(String),
    #[error("invalid response from synthesis backend: {0}")]
    InvalidResponse(String),
    #[error("chunk {index} synthesis failed: {source}")]
    ChunkFailed {
        index: usize,
        #[source]
        source: Box<SynthesisError>,
    },
    #[error("chunk {index}: expected {expected} marks, backend returned {got}")]
    MarkMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("chunk {index}: bad audio: {message}")]
    InvalidAudio { index: usize, message: String },
    #[error("chunk {index}: sample rate {got} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        index: usize,
        expected: u32,
        got: u32,
    },
    #[error("stitched timeline is not monotonic at timepoint {0}")]
    NonMonotonic(usize),
    #[error(
        "last timepoint at {last_time:.3}s exceeds total duration {total:.3}s"
    )]
    TimepointPastEnd { last_time: f64, total: f64 },
}

impl SynthesisError {
    /// Transport errors and backend 5xx are worth retrying; everything else
    /// is terminal.
    fn is_retryable(&self) -> bool {
        matches!(self, SynthesisError::Request(_))
    }
}

/// Voice selection passed through to the backend unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VoiceParams {
    pub name: String,
    pub speaking_rate: f32,
    pub pitch: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            name: "en-US-Journey-F".to_string(),
            speaking_rate: 1.0,
            pitch: 0.0,
        }
    }
}

/// One chunk's synthesis request.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub markup: String,
    pub voice: VoiceParams,
}

/// A chunk-local (mark name, offset) pair; offsets are relative to the start
/// of this chunk's audio.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkOffset {
    pub mark_name: String,
    pub offset_seconds: f64,
}

/// One chunk's synthesis result: LINEAR16 WAV plus chunk-local offsets.
#[derive(Debug, Clone)]
pub struct ChunkAudio {
    pub audio: Vec<u8>,
    pub timepoints: Vec<MarkOffset>,
}

/// The external synthesis capability, one call per chunk.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize_chunk(&self, request: &ChunkRequest)
        -> Result<ChunkAudio, SynthesisError>;
}

#[derive(serde::Serialize)]
struct BackendRequest<'a> {
    markup_text: &'a str,
    voice: &'a VoiceParams,
    /// The backend only emits mark timing when asked.
    enable_timepoints: bool,
}

#[derive(serde::Deserialize)]
struct BackendResponse {
    /// Base64-encoded LINEAR16 WAV.
    #[serde(default)]
    audio_content: Option<String>,
    #[serde(default)]
    timepoints: Vec<MarkOffset>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP synthesis backend with bounded retry.
pub struct HttpSynthesisBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesisBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SynthesisError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn call_once(&self, request: &ChunkRequest) -> Result<ChunkAudio, SynthesisError> {
        let body = BackendRequest {
            markup_text: &request.markup,
            voice: &request.voice,
            enable_timepoints: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SynthesisError::Request(format!(
                "backend returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend(format!("{}: {}", status, detail)));
        }

        let payload: BackendResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(e.to_string()))?;

        if let Some(message) = payload.error {
            return Err(SynthesisError::Backend(message));
        }

        let audio_b64 = payload
            .audio_content
            .ok_or_else(|| SynthesisError::InvalidResponse("no audio in response".to_string()))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&audio_b64)
            .map_err(|e| SynthesisError::InvalidResponse(format!("base64 decode error: {}", e)))?;

        Ok(ChunkAudio {
            audio,
            timepoints: payload.timepoints,
        })
    }
}

#[async_trait]
impl SynthesisBackend for HttpSynthesisBackend {
    async fn synthesize_chunk(
        &self,
        request: &ChunkRequest,
    ) -> Result<ChunkAudio, SynthesisError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.call_once(request).await {
                Ok(audio) => return Ok(audio),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_millis(BACKOFF_MS * (1 << (attempt - 1)));
                    log::warn!(
                        "synthesis attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        MAX_ATTEMPTS,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable_backend_errors_are_not() {
        assert!(SynthesisError::Request("timeout".into()).is_retryable());
        assert!(!SynthesisError::Backend("bad ssml".into()).is_retryable());
        assert!(!SynthesisError::InvalidResponse("garbage".into()).is_retryable());
    }

    #[test]
    fn backend_request_serializes_with_timepoints_enabled() {
        let voice = VoiceParams::default();
        let body = BackendRequest {
            markup_text: "<speak/>",
            voice: &voice,
            enable_timepoints: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["enable_timepoints"], true);
        assert_eq!(json["voice"]["name"], "en-US-Journey-F");
    }
}
