//! Remote store client for media uploads.
//!
//! The rest of the engine only needs two things from the remote side: an
//! upload operation returning the remote identity, and a split between
//! retryable (network/timeout/server) and non-retryable (validation)
//! failures.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};

/// What kind of media a blob is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    AudioFile,
    Recording,
}

impl MediaKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::AudioFile => "audio_file",
            Self::Recording => "recording",
        }
    }
}

/// Metadata accompanying an uploaded blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub user_id: String,
    pub kind: MediaKind,
    pub title: String,
    pub original_filename: String,
    pub mime_type: String,
    pub duration_secs: i64,
    /// Flashcard the blob belongs to, for recordings
    pub card_id: Option<String>,
}

/// Remote identity assigned to an uploaded blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub remote_id: String,
    pub remote_url: String,
}

/// Upload operations against the remote store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Push one blob with its metadata; returns the remote identity.
    ///
    /// Fails with [`Error::RemoteUploadFailed`] for transient problems and
    /// [`Error::RemoteUploadRejected`] when retrying the same payload is
    /// pointless.
    async fn upload(&self, metadata: &UploadMetadata, bytes: &[u8]) -> Result<RemoteObject>;
}

/// HTTP-backed remote store client
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Build a client for an explicit API base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::InvalidInput(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    /// Returns the base URL this client was configured with
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    remote_id: String,
    remote_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upload(&self, metadata: &UploadMetadata, bytes: &[u8]) -> Result<RemoteObject> {
        let url = format!(
            "{}/v1/users/{}/media",
            self.base_url, metadata.user_id
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", metadata.mime_type.clone())
            .header("X-Parla-Kind", metadata.kind.as_str())
            .header("X-Parla-Title", metadata.title.clone())
            .header("X-Parla-Filename", metadata.original_filename.clone())
            .header("X-Parla-Duration-Secs", metadata.duration_secs)
            .header("Accept", "application/json");
        if let Some(card_id) = &metadata.card_id {
            request = request.header("X-Parla-Card-Id", card_id.clone());
        }

        let response = request
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|error| Error::RemoteUploadFailed(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &parse_api_error(status, &body)));
        }

        let payload = response
            .json::<UploadResponse>()
            .await
            .map_err(|error| Error::RemoteUploadFailed(error.to_string()))?;

        Ok(RemoteObject {
            remote_id: payload.remote_id,
            remote_url: payload.remote_url,
        })
    }
}

/// Map an HTTP status onto the retryable/permanent error split
fn classify_status(status: StatusCode, message: &str) -> Error {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::RemoteUploadFailed(message.to_string())
    } else {
        Error::RemoteUploadRejected(message.to_string())
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "Remote store base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "Remote store base URL must include http:// or https://".to_string(),
        ))
    }
}
