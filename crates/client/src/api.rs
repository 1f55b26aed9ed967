//! HTTP transport to the tutor server.
//!
//! Every failure leaving this module is already a classified [`TurnError`]:
//! callers never see raw `reqwest` errors or server response bodies.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, warn};
use tutor_core::{
    conversation::{ChatTurn, ExamContext},
    error::{ErrorKind, TurnError},
    turn::VoiceTurnResult,
    wire::{ChatRequest, ChatResponse, ErrorResponse, TtsRequest, TtsResponse},
};

/// Round trip of a full voice turn: three provider calls in sequence.
pub const VOICE_TURN_TIMEOUT: Duration = Duration::from_secs(60);
/// Single-stage calls (`/chat`, `/tts`).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Audio plus context for `POST /voice-turn`.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTurnUpload {
    pub audio: Vec<u8>,
    pub mime_type: Option<String>,
    pub history: Vec<ChatTurn>,
    pub exam_context: ExamContext,
}

/// The tutor server's wire contract as seen by the client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TutorApi: Send + Sync {
    async fn voice_turn(&self, upload: &VoiceTurnUpload) -> Result<VoiceTurnResult, TurnError>;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TurnError>;

    /// Speech for `text` via `/tts`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TurnError>;
}

pub struct HttpTutorApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTutorApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Connection, DNS and timeout failures all read as "server unreachable".
fn transport_error(err: reqwest::Error) -> TurnError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        TurnError::new(ErrorKind::NetworkUnreachable, err.to_string())
    } else {
        TurnError::new(ErrorKind::ProviderFatal, err.to_string())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, TurnError> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;

    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        let kind = ErrorKind::from_status(status.as_u16());
        warn!(status = %status, ?kind, %detail, "Tutor server returned an error");
        return Err(TurnError::new(kind, detail));
    }

    serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Undecodable tutor server response");
        TurnError::new(ErrorKind::ProviderFatal, format!("invalid response body: {e}"))
    })
}

#[async_trait]
impl TutorApi for HttpTutorApi {
    async fn voice_turn(&self, upload: &VoiceTurnUpload) -> Result<VoiceTurnResult, TurnError> {
        let history = serde_json::to_string(&upload.history)
            .map_err(|e| TurnError::validation(e.to_string()))?;
        let exam_context = serde_json::to_string(&upload.exam_context)
            .map_err(|e| TurnError::validation(e.to_string()))?;

        let mut audio = Part::bytes(upload.audio.clone()).file_name("turn.m4a");
        if let Some(mime_type) = &upload.mime_type {
            audio = audio
                .mime_str(mime_type)
                .map_err(|e| TurnError::validation(format!("invalid MIME type: {e}")))?;
        }
        let mut form = Form::new()
            .part("audio", audio)
            .text("history", history)
            .text("examContext", exam_context);
        if let Some(mime_type) = &upload.mime_type {
            form = form.text("mimeType", mime_type.clone());
        }

        debug!(audio_bytes = upload.audio.len(), "Sending voice turn");
        let response = self
            .http
            .post(self.url("/voice-turn"))
            .timeout(VOICE_TURN_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TurnError> {
        let response = self
            .http
            .post(self.url("/chat"))
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TurnError> {
        let response = self
            .http
            .post(self.url("/tts"))
            .timeout(REQUEST_TIMEOUT)
            .json(&TtsRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(transport_error)?;
        let body: TtsResponse = decode(response).await?;
        Ok(body.audio_bytes)
    }
}
