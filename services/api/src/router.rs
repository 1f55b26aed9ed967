//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the voice-turn API and its OpenAPI documentation.

use crate::{
    handlers::{self, VoiceTurnForm},
    state::AppState,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tutor_core::{
    conversation::{ChatTurn, ExamContext},
    turn::VoiceTurnResult,
    wire::{
        ChatRequest, ChatResponse, ErrorResponse, HealthResponse, SttResponse, TtsRequest,
        TtsResponse,
    },
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted upload; a minute of compressed speech is well under this.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::voice_turn,
        handlers::stt,
        handlers::chat,
        handlers::tts,
        handlers::health,
    ),
    components(
        schemas(
            VoiceTurnForm, VoiceTurnResult, ChatRequest, ChatResponse, SttResponse, TtsRequest,
            TtsResponse, HealthResponse, ErrorResponse, ChatTurn, ExamContext
        )
    ),
    tags(
        (name = "Tutor API", description = "Voice-turn pipeline for the spoken exam tutor")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/voice-turn", post(handlers::voice_turn))
        .route("/stt", post(handlers::stt))
        .route("/chat", post(handlers::chat))
        .route("/tts", post(handlers::tts))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state);

    // The mobile client runs on arbitrary origins during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(cors)
}
