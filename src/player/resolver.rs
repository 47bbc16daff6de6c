//! Resolves a read request to an `AudioAsset`.
//!
//! Two-step: look up a pre-generated asset by document id, and fall back to
//! on-demand synthesis of the source text when the lookup fails for any
//! reason. Both paths yield the same asset shape, so the fallback is
//! invisible to the playback engine. On-demand results are not cached here;
//! caching belongs to the ingestion pipeline.

use crate::timepoint::{AudioAsset, TimepointSequence};
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("asset lookup failed: {0}")]
    Lookup(String),
    #[error("on-demand synthesis failed: {0}")]
    Synthesis(String),
    #[error("malformed asset payload: {0}")]
    Malformed(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// What a playback request points at: an optional pre-generated document id
/// plus the raw text to synthesize if the stored asset is unavailable.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceRef {
    pub document_id: Option<String>,
    pub text: String,
}

impl SourceRef {
    pub fn document(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            text: text.into(),
        }
    }

    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            document_id: None,
            text: text.into(),
        }
    }
}

/// Outcome of resolution; the fallback path is a first-class branch, not an
/// exception handler.
#[derive(Debug)]
pub enum Resolution {
    /// Pre-generated asset fetched successfully.
    Resolved(AudioAsset),
    /// Stored lookup failed; on-demand synthesis succeeded.
    Fallback(AudioAsset),
    /// Both paths failed.
    Failed(ResolverError),
}

#[derive(serde::Deserialize)]
struct LookupResponse {
    audio_url: String,
    timepoints_url: String,
}

#[derive(serde::Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct SynthesizeResponse {
    /// Base64-encoded WAV.
    audio_content: String,
    timepoints: TimepointSequence,
}

/// Seam between the playback engine and asset resolution. The engine only
/// ever sees a `Resolution`, whichever path produced it.
#[async_trait]
pub trait ResolveAssets: Send + Sync {
    async fn resolve(&self, source: &SourceRef) -> Resolution;
}

/// Client-side asset resolver against the reading service.
pub struct AssetResolver {
    client: reqwest::Client,
    base_url: String,
}

impl AssetResolver {
    /// `base_url` is the service root, e.g. `http://127.0.0.1:8080`.
    /// Every request carries `timeout`; a timeout behaves as a failure of
    /// that path, never a hang.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ResolverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::Client(e.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    /// Resolve `source`, preferring the stored asset.
    pub async fn resolve(&self, source: &SourceRef) -> Resolution {
        if let Some(document_id) = source.document_id.as_deref() {
            match self.fetch_stored(document_id).await {
                Ok(asset) => return Resolution::Resolved(asset),
                Err(e) => {
                    log::info!(
                        "stored asset unavailable for {} ({}), falling back to on-demand synthesis",
                        document_id,
                        e
                    );
                }
            }
        }

        match self.synthesize_on_demand(&source.text).await {
            Ok(asset) => match source.document_id {
                Some(_) => Resolution::Fallback(asset),
                None => Resolution::Resolved(asset),
            },
            Err(e) => Resolution::Failed(e),
        }
    }

    async fn fetch_stored(&self, document_id: &str) -> Result<AudioAsset, ResolverError> {
        let lookup_url = format!(
            "{}/api/documents/{}/audio",
            self.base_url,
            urlencoding::encode(document_id)
        );

        let lookup: LookupResponse = self
            .client
            .get(&lookup_url)
            .send()
            .await
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .error_for_status()
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolverError::Malformed(e.to_string()))?;

        let audio = self
            .client
            .get(self.absolute(&lookup.audio_url))
            .send()
            .await
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .error_for_status()
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .to_vec();

        let timepoints: TimepointSequence = self
            .client
            .get(self.absolute(&lookup.timepoints_url))
            .send()
            .await
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .error_for_status()
            .map_err(|e| ResolverError::Lookup(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolverError::Malformed(e.to_string()))?;

        if !timepoints.is_monotonic() {
            return Err(ResolverError::Malformed(
                "stored timepoints are not monotonic".to_string(),
            ));
        }

        Ok(AudioAsset::new(audio, timepoints))
    }

    async fn synthesize_on_demand(&self, text: &str) -> Result<AudioAsset, ResolverError> {
        let url = format!("{}/api/tts/synthesize", self.base_url);

        let response: SynthesizeResponse = self
            .client
            .post(&url)
            .json(&SynthesizeRequest { text })
            .send()
            .await
            .map_err(|e| ResolverError::Synthesis(e.to_string()))?
            .error_for_status()
            .map_err(|e| ResolverError::Synthesis(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolverError::Malformed(e.to_string()))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&response.audio_content)
            .map_err(|e| ResolverError::Malformed(format!("base64 decode error: {}", e)))?;

        Ok(AudioAsset::new(audio, response.timepoints))
    }

    /// Lookup responses may carry service-relative URLs.
    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }
}

#[async_trait]
impl ResolveAssets for AssetResolver {
    async fn resolve(&self, source: &SourceRef) -> Resolution {
        AssetResolver::resolve(self, source).await
    }
}
