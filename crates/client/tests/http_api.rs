//! `HttpTutorApi` against an in-process stub of the tutor server.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde_json::{Value, json};
use tutor_client::api::{HttpTutorApi, TutorApi, VoiceTurnUpload};
use tutor_core::{
    conversation::{ChatTurn, ExamContext},
    error::ErrorKind,
    wire::ChatRequest,
};

/// Multipart parts the stub received: name -> (content type, bytes).
type Parts = Arc<Mutex<HashMap<String, (Option<String>, Vec<u8>)>>>;

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn voice_turn_stub(status: StatusCode, reply: Value) -> (String, Parts) {
    let parts: Parts = Arc::default();
    let handler = move |State(parts): State<Parts>, mut multipart: Multipart| {
        let reply = reply.clone();
        async move {
            while let Some(field) = multipart.next_field().await.unwrap() {
                let name = field.name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.unwrap().to_vec();
                parts.lock().unwrap().insert(name, (content_type, bytes));
            }
            (status, Json(reply)).into_response()
        }
    };
    let router = Router::new()
        .route("/voice-turn", post(handler))
        .with_state(parts.clone());
    (spawn_stub(router).await, parts)
}

async fn json_stub(path: &str, status: StatusCode, reply: Value) -> (String, Arc<Mutex<Option<Value>>>) {
    let seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let handler = move |State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| {
        let reply = reply.clone();
        async move {
            *seen.lock().unwrap() = Some(body);
            (status, Json(reply)).into_response()
        }
    };
    let router = Router::new()
        .route(path, post(handler))
        .with_state(seen.clone());
    (spawn_stub(router).await, seen)
}

fn upload() -> VoiceTurnUpload {
    VoiceTurnUpload {
        audio: vec![7; 16],
        mime_type: Some("audio/m4a".into()),
        history: vec![ChatTurn::new("What is a cell?", "The basic unit of life.")],
        exam_context: ExamContext::new("GCSE", "Biology", "Cells"),
    }
}

#[tokio::test]
async fn test_voice_turn_sends_all_fields() {
    let (base, parts) = voice_turn_stub(
        StatusCode::OK,
        json!({
            "transcript": "What is osmosis?",
            "replyText": "Water moving across a membrane.",
            "audioBase64": "AQI="
        }),
    )
    .await;

    let result = HttpTutorApi::new(format!("{base}/"))
        .voice_turn(&upload())
        .await
        .unwrap();
    assert_eq!(result.transcript, "What is osmosis?");
    assert_eq!(result.audio_bytes, vec![1, 2]);

    let parts = parts.lock().unwrap();
    let (audio_type, audio) = &parts["audio"];
    assert_eq!(audio, &vec![7; 16]);
    assert_eq!(audio_type.as_deref(), Some("audio/m4a"));
    assert_eq!(parts["mimeType"].1, b"audio/m4a".to_vec());

    let history: Value = serde_json::from_slice(&parts["history"].1).unwrap();
    assert_eq!(
        history,
        json!([{"user": "What is a cell?", "assistant": "The basic unit of life."}])
    );
    let context: Value = serde_json::from_slice(&parts["examContext"].1).unwrap();
    assert_eq!(context["examType"], "GCSE");
    assert_eq!(context["topic"], "Cells");
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let cases = [
        (StatusCode::BAD_REQUEST, ErrorKind::ValidationError),
        (StatusCode::UNPROCESSABLE_ENTITY, ErrorKind::ProviderFatal),
        (StatusCode::SERVICE_UNAVAILABLE, ErrorKind::ProviderTransient),
        (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::ProviderTransient),
    ];
    for (status, kind) in cases {
        let (base, _) = voice_turn_stub(status, json!({"error": "No audio file uploaded"})).await;
        let err = HttpTutorApi::new(base)
            .voice_turn(&upload())
            .await
            .unwrap_err();
        assert_eq!(err.kind, kind, "status {status}");
        assert_eq!(err.detail, "No audio file uploaded");
    }
}

#[tokio::test]
async fn test_connection_refused_is_network_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = HttpTutorApi::new(format!("http://{addr}"))
        .voice_turn(&upload())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NetworkUnreachable);
}

#[tokio::test]
async fn test_undecodable_body_is_fatal() {
    let (base, _) = voice_turn_stub(StatusCode::OK, json!({"unexpected": true})).await;
    let err = HttpTutorApi::new(base)
        .voice_turn(&upload())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProviderFatal);
}

#[tokio::test]
async fn test_chat_posts_camel_case_body() {
    let (base, seen) = json_stub("/chat", StatusCode::OK, json!({"replyText": "Good thinking."})).await;

    let request = ChatRequest {
        user_text: "Is x = 2?".into(),
        history: vec![],
        exam_context: ExamContext::new("A-Level", "Maths", "Algebra"),
        question_text: Some("Solve 2x = 4".into()),
        working_space: None,
    };
    let response = HttpTutorApi::new(base).chat(&request).await.unwrap();
    assert_eq!(response.reply_text, "Good thinking.");

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["userText"], "Is x = 2?");
    assert_eq!(body["questionText"], "Solve 2x = 4");
    assert_eq!(body["examContext"]["subject"], "Maths");
}

#[tokio::test]
async fn test_synthesize_decodes_audio() {
    let (base, seen) = json_stub("/tts", StatusCode::OK, json!({"audioBase64": "AQI="})).await;

    let audio = HttpTutorApi::new(base).synthesize("Hello").await.unwrap();
    assert_eq!(audio, vec![1, 2]);
    assert_eq!(seen.lock().unwrap().clone().unwrap(), json!({"text": "Hello"}));
}
