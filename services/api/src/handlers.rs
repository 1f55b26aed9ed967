//! Axum Handlers for the Tutor API
//!
//! One handler per wire endpoint. Handlers only parse and validate input,
//! then delegate to the shared `TurnOrchestrator`.

use axum::{
    extract::{Json, Multipart, State, multipart::Field, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{error, info, warn};
use tutor_core::{
    conversation::{ChatTurn, ExamContext},
    error::{ErrorKind, TurnError},
    orchestrator::NO_AUDIO_MESSAGE,
    turn::{VoiceTurnRequest, VoiceTurnResult},
    wire::{
        ChatRequest, ChatResponse, ErrorResponse, HealthResponse, SttResponse, TtsRequest,
        TtsResponse,
    },
};
use utoipa::ToSchema;

use crate::{audio_utils::normalize_audio_mime, state::AppState};

pub enum ApiError {
    BadRequest(String),
    Turn(TurnError),
}

/// HTTP status for a classified turn failure.
///
/// Fatal provider failures use 422 so callers can tell them apart from the
/// transient 503 and skip retrying.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::ProviderFatal => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ProviderTransient | ErrorKind::NetworkUnreachable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::PermissionDenied | ErrorKind::CaptureFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                warn!(%message, "Rejected request");
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
            }
            ApiError::Turn(err) => {
                let status = status_for(err.kind);
                let message = if err.kind == ErrorKind::ValidationError {
                    err.detail
                } else {
                    error!(kind = ?err.kind, detail = %err.detail, "Turn failed");
                    err.kind.user_message().to_string()
                };
                (status, Json(ErrorResponse { error: message })).into_response()
            }
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        Self::Turn(err)
    }
}

/// Multipart form of `POST /voice-turn` and `POST /stt`.
#[derive(Debug, Default, ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct VoiceTurnForm {
    /// Recorded audio file.
    #[schema(value_type = String, format = Binary)]
    pub audio: Option<Vec<u8>>,
    /// MIME type of the recording; the audio part's own content type is used when absent.
    pub mime_type: Option<String>,
    /// JSON array of `{user, assistant}` exchanges, oldest first.
    pub history: Vec<ChatTurn>,
    /// JSON object `{examType, subject, topic, difficulty?}`.
    pub exam_context: ExamContext,
    pub question_text: Option<String>,
    pub working_space: Option<String>,
}

impl VoiceTurnForm {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = VoiceTurnForm::default();
        let mut part_mime = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "audio" => {
                    part_mime = field
                        .content_type()
                        .filter(|m| m.starts_with("audio/"))
                        .map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Invalid audio upload: {e}")))?;
                    form.audio = Some(bytes.to_vec());
                }
                "mimeType" => form.mime_type = non_blank(read_text(field).await?),
                "history" => form.history = parse_json_field(&name, field).await?,
                "examContext" => form.exam_context = parse_json_field(&name, field).await?,
                "questionText" => form.question_text = non_blank(read_text(field).await?),
                "workingSpace" => form.working_space = non_blank(read_text(field).await?),
                _ => {}
            }
        }

        form.mime_type = form.mime_type.or(part_mime);
        Ok(form)
    }

    /// Audio bytes and normalized MIME type; a missing or empty upload is a validation error.
    fn take_audio(&mut self) -> Result<(Vec<u8>, String), ApiError> {
        let audio = self.audio.take().filter(|a| !a.is_empty()).ok_or_else(|| {
            ApiError::Turn(TurnError::validation(NO_AUDIO_MESSAGE))
        })?;
        Ok((audio, normalize_audio_mime(self.mime_type.as_deref())))
    }
}

async fn read_text(field: Field<'_>) -> Result<String, ApiError> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid {name} field: {e}")))
}

async fn parse_json_field<T: DeserializeOwned + Default>(
    name: &str,
    field: Field<'_>,
) -> Result<T, ApiError> {
    let text = read_text(field).await?;
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text).map_err(|e| ApiError::BadRequest(format!("Invalid {name} JSON: {e}")))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Run a full voice turn: transcribe, reply, and synthesize.
#[utoipa::path(
    post,
    path = "/voice-turn",
    request_body(content = VoiceTurnForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Transcript, reply, and reply audio (may be empty)", body = VoiceTurnResult),
        (status = 400, description = "No audio uploaded or malformed fields", body = ErrorResponse),
        (status = 422, description = "Provider rejected the request", body = ErrorResponse),
        (status = 503, description = "Provider temporarily unavailable", body = ErrorResponse)
    )
)]
pub async fn voice_turn(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<VoiceTurnResult>, ApiError> {
    let mut form = VoiceTurnForm::from_multipart(multipart).await?;
    let (audio, mime_type) = form.take_audio()?;
    info!(
        audio_bytes = audio.len(),
        %mime_type,
        history = form.history.len(),
        "Voice turn received"
    );

    let request = VoiceTurnRequest::audio(audio, Some(mime_type), form.history, form.exam_context)
        .with_question(form.question_text, form.working_space);
    let result = state.orchestrator.run(request).await?;
    Ok(Json(result))
}

/// Transcribe audio without generating a reply.
#[utoipa::path(
    post,
    path = "/stt",
    request_body(content = VoiceTurnForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Transcript, empty when no speech was detected", body = SttResponse),
        (status = 400, description = "No audio uploaded", body = ErrorResponse),
        (status = 422, description = "Provider rejected the audio", body = ErrorResponse),
        (status = 503, description = "Provider temporarily unavailable", body = ErrorResponse)
    )
)]
pub async fn stt(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<SttResponse>, ApiError> {
    let mut form = VoiceTurnForm::from_multipart(multipart).await?;
    let (audio, mime_type) = form.take_audio()?;
    let transcript = state
        .orchestrator
        .transcribe(&audio, Some(&mime_type))
        .await?;
    Ok(Json(SttResponse { transcript }))
}

/// Generate a text reply without synthesis.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Tutor reply", body = ChatResponse),
        (status = 400, description = "Malformed request body", body = ErrorResponse),
        (status = 422, description = "Provider rejected the request", body = ErrorResponse),
        (status = 503, description = "Provider temporarily unavailable", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let reply_text = state
        .orchestrator
        .reply(
            &request.user_text,
            &request.history,
            &request.exam_context,
            request.question_text.as_deref(),
            request.working_space.as_deref(),
        )
        .await?;
    Ok(Json(ChatResponse { reply_text }))
}

/// Synthesize speech for arbitrary text.
#[utoipa::path(
    post,
    path = "/tts",
    request_body = TtsRequest,
    responses(
        (status = 200, description = "Base64-encoded MP3 audio", body = TtsResponse),
        (status = 400, description = "Missing or blank text", body = ErrorResponse),
        (status = 422, description = "Provider rejected the text", body = ErrorResponse),
        (status = 503, description = "Provider temporarily unavailable", body = ErrorResponse)
    )
)]
pub async fn tts(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Json<TtsResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let audio_bytes = state.orchestrator.synthesize(&request.text).await?;
    Ok(Json(TtsResponse { audio_bytes }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
