//! HTTP surface of the reading service.
//!
//! Three concerns: on-demand synthesis for text the client holds, document
//! pre-generation at ingestion time, and serving the stored assets the
//! client-side resolver looks up. Assets live in an in-memory store keyed by
//! document id.

use crate::config::Settings;
use crate::timepoint::{AudioAsset, TimepointSequence};
use crate::tts::{synthesize_document, HttpSynthesisBackend, SynthesisBackend, VoiceParams};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AppState {
    backend: Arc<dyn SynthesisBackend>,
    voice: VoiceParams,
    max_chunk_chars: usize,
    store: RwLock<HashMap<String, Arc<AudioAsset>>>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        voice: VoiceParams,
        max_chunk_chars: usize,
    ) -> Self {
        Self {
            backend,
            voice,
            max_chunk_chars,
            store: RwLock::new(HashMap::new()),
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[derive(serde::Deserialize)]
struct SynthesizeBody {
    text: String,
    #[serde(default)]
    voice_name: Option<String>,
    #[serde(default)]
    speaking_rate: Option<f32>,
    #[serde(default)]
    pitch: Option<f32>,
}

impl SynthesizeBody {
    /// Configured voice with any per-request overrides applied.
    fn voice(&self, defaults: &VoiceParams) -> VoiceParams {
        VoiceParams {
            name: self.voice_name.clone().unwrap_or_else(|| defaults.name.clone()),
            speaking_rate: self.speaking_rate.unwrap_or(defaults.speaking_rate),
            pitch: self.pitch.unwrap_or(defaults.pitch),
        }
    }
}

#[derive(serde::Serialize)]
struct SynthesizeReply {
    /// Base64-encoded WAV.
    audio_content: String,
    timepoints: TimepointSequence,
}

#[derive(serde::Serialize)]
struct LookupReply {
    audio_url: String,
    timepoints_url: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/tts/synthesize", post(synthesize))
        .route(
            "/api/documents/:id/audio",
            get(lookup_document).post(pregenerate_document),
        )
        .route("/api/documents/:id/audio.wav", get(document_audio))
        .route("/api/documents/:id/timepoints.json", get(document_timepoints))
        .with_state(state)
}

/// Run the service until the process is stopped.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let backend = Arc::new(HttpSynthesisBackend::new(
        settings.backend_url.clone(),
        settings.request_timeout,
    )?);
    let state = Arc::new(AppState::new(
        backend,
        settings.voice.clone(),
        settings.max_chunk_chars,
    ));

    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    log::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn run_pipeline(
    state: &AppState,
    text: &str,
    voice: &VoiceParams,
) -> Result<AudioAsset, ApiError> {
    match synthesize_document(state.backend.as_ref(), text, voice, state.max_chunk_chars).await
    {
        Ok(Some(asset)) => Ok(asset),
        Ok(None) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "no speakable words in input",
        )),
        Err(e) => {
            log::error!("synthesis failed: {}", e);
            Err(ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

/// On-demand synthesis: the whole asset comes back inline.
async fn synthesize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SynthesizeBody>,
) -> Result<Json<SynthesizeReply>, ApiError> {
    let voice = body.voice(&state.voice);
    let asset = run_pipeline(&state, &body.text, &voice).await?;
    Ok(Json(SynthesizeReply {
        audio_content: base64::engine::general_purpose::STANDARD.encode(&asset.audio),
        timepoints: asset.timepoints,
    }))
}

fn asset_urls(id: &str) -> LookupReply {
    let encoded = urlencoding::encode(id);
    LookupReply {
        audio_url: format!("/api/documents/{}/audio.wav", encoded),
        timepoints_url: format!("/api/documents/{}/timepoints.json", encoded),
    }
}

/// Pre-generate and store a document's asset; replaces any previous one.
async fn pregenerate_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SynthesizeBody>,
) -> Result<Json<LookupReply>, ApiError> {
    let voice = body.voice(&state.voice);
    let asset = run_pipeline(&state, &body.text, &voice).await?;
    state.store.write().await.insert(id.clone(), Arc::new(asset));
    log::info!("stored pre-generated audio for document {}", id);
    Ok(Json(asset_urls(&id)))
}

async fn lookup_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LookupReply>, ApiError> {
    if state.store.read().await.contains_key(&id) {
        Ok(Json(asset_urls(&id)))
    } else {
        Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no audio for document {}", id),
        ))
    }
}

async fn document_audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let asset = fetch_asset(&state, &id).await?;
    Ok((
        [(header::CONTENT_TYPE, "audio/wav")],
        asset.audio.clone(),
    )
        .into_response())
}

async fn document_timepoints(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TimepointSequence>, ApiError> {
    let asset = fetch_asset(&state, &id).await?;
    Ok(Json(asset.timepoints.clone()))
}

async fn fetch_asset(state: &AppState, id: &str) -> Result<Arc<AudioAsset>, ApiError> {
    state.store.read().await.get(id).cloned().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no audio for document {}", id),
        )
    })
}
