//! Speech-to-text collaborator.
//!
//! Transcription is an opaque `audio file -> text` capability behind the
//! [`Transcriber`] trait. [`WhisperClient`] talks to any server exposing the
//! OpenAI-compatible `/v1/audio/transcriptions` endpoint.
//!
//! Uploads are admitted by [`check_audio_file`] before any bytes leave the
//! process.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

/// Accepted audio file extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["wav", "mp3", "flac", "ogg", "webm", "m4a"];

/// Largest accepted upload (16 MiB).
pub const MAX_AUDIO_BYTES: u64 = 16 * 1024 * 1024;

pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

const LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("audio file not found: {0}")]
    MissingFile(String),

    #[error("unsupported audio format '{0}' (expected one of wav, mp3, flac, ogg, webm, m4a)")]
    UnsupportedFormat(String),

    #[error("audio file is {0} bytes, larger than the 16 MiB limit")]
    TooLarge(u64),

    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("audio transcription is disabled (set WHISPER_BASE_URL)")]
    Disabled,
}

/// Check that `path` names an existing audio file of an accepted type and size.
pub fn check_audio_file(path: &Path) -> Result<u64, TranscribeError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(TranscribeError::MissingFile(path.display().to_string())),
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(TranscribeError::UnsupportedFormat(extension));
    }

    let size = metadata.len();
    if size > MAX_AUDIO_BYTES {
        return Err(TranscribeError::TooLarge(size));
    }
    Ok(size)
}

/// Converts an audio file to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscribeError>;
}

// ============================================================================
// Whisper HTTP backend
// ============================================================================

/// Client for an OpenAI-compatible transcription server.
pub struct WhisperClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperClient {
    /// Build a client from `WHISPER_BASE_URL`, `WHISPER_MODEL` and
    /// `WHISPER_API_KEY`. Returns `None` when no base URL is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("WHISPER_BASE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }

        let mut client = Self::new(base_url);
        if let Ok(model) = std::env::var("WHISPER_MODEL")
            && !model.trim().is_empty()
        {
            client.model = model.trim().to_string();
        }
        client.api_key = std::env::var("WHISPER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Some(client)
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_WHISPER_MODEL.to_string(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscribeError> {
        check_audio_file(path)?;

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = Form::new()
            .text("model", self.model.clone())
            .text("language", LANGUAGE)
            .part("file", Part::bytes(bytes).file_name(file_name));

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscribeError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| TranscribeError::Http(e.to_string()))?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::Parse(e.to_string()))?;

        Ok(body.text.trim().to_string())
    }
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Returns a fixed transcript after running the same admission checks as
/// the real backend.
#[cfg(test)]
pub struct MockTranscriber {
    pub transcript: String,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscribeError> {
        check_audio_file(path)?;
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.transcript.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
