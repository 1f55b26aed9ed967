//! Google Gemini `generateContent` adapters: the fallback transcriber and the
//! default responder.

use super::{check_status, read_json, send_error};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use gemini_types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
    SafetySetting,
};
use tracing::{debug, info, warn};
use tutor_core::{
    error::{ProviderError, ProviderOutcome},
    prompt::{NO_SPEECH_SENTINEL, ReplyPrompt},
    stages::{Responder, Transcriber},
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const BLOCKING_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "RECITATION",
];

// --- Local Gemini REST Types (for encapsulation) ---
mod gemini_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateContentRequest {
        pub contents: Vec<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub system_instruction: Option<Content>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub safety_settings: Vec<SafetySetting>,
        pub generation_config: GenerationConfig,
    }

    #[derive(Serialize, Deserialize, Default)]
    pub(super) struct Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<String>,
        #[serde(default)]
        pub parts: Vec<Part>,
    }

    #[derive(Serialize, Deserialize, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Part {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub inline_data: Option<InlineData>,
    }

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct InlineData {
        pub mime_type: String,
        pub data: String,
    }

    #[derive(Serialize)]
    pub(super) struct SafetySetting {
        pub category: String,
        pub threshold: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub temperature: f32,
        pub max_output_tokens: u32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateContentResponse {
        #[serde(default)]
        pub candidates: Vec<Candidate>,
        pub prompt_feedback: Option<PromptFeedback>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Candidate {
        pub content: Option<Content>,
        pub finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PromptFeedback {
        pub block_reason: Option<String>,
    }
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(String::from),
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

/// Shared `generateContent` call used by both adapters.
struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    async fn generate(&self, request: &GenerateContentRequest) -> ProviderOutcome<String> {
        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(PROVIDER, e))?;

        let response = check_status(PROVIDER, response).await?;
        let body: GenerateContentResponse = read_json(PROVIDER, response).await?;
        candidate_text(body)
    }
}

/// Extracts the first candidate's text. Blocks and empty output are fatal.
fn candidate_text(response: GenerateContentResponse) -> ProviderOutcome<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        warn!(block_reason = %reason, "Gemini blocked the prompt");
        return Err(ProviderError::Fatal(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::Fatal("gemini returned no candidates".into()));
    };
    if let Some(reason) = candidate
        .finish_reason
        .as_deref()
        .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
    {
        warn!(finish_reason = %reason, "Gemini withheld the response");
        return Err(ProviderError::Fatal(format!("response blocked: {reason}")));
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::Fatal("gemini returned empty text".into()));
    }
    Ok(text)
}

/// Fallback transcription through a multimodal model.
///
/// The model is told to answer with [`NO_SPEECH_SENTINEL`] when it hears
/// nothing, which maps back to an empty transcript here. The sentinel never
/// leaves this adapter.
pub struct GeminiTranscriber {
    client: GeminiClient,
    language: String,
}

impl GeminiTranscriber {
    pub fn new(http: reqwest::Client, api_key: String, model: String, language: String) -> Self {
        Self {
            client: GeminiClient {
                http,
                api_key,
                model,
                base_url: GEMINI_BASE_URL.to_string(),
            },
            language,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }

    fn instruction(&self) -> String {
        format!(
            "Transcribe the speech in this audio verbatim. The speaker is using language code '{}'. \
Write exactly the words spoken, including hesitations, and do not answer, summarise or correct them. \
Output only the transcript with no commentary. \
If the audio contains no intelligible speech, output exactly {} and nothing else.",
            self.language, NO_SPEECH_SENTINEL
        )
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> ProviderOutcome<String> {
        debug!(audio_bytes = audio.len(), mime_type, "Starting Gemini transcription");
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![
                    Part {
                        text: Some(self.instruction()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(audio),
                        }),
                    },
                ],
            }],
            system_instruction: None,
            safety_settings: Vec::new(),
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 1024,
            },
        };

        let text = self.client.generate(&request).await?;
        let transcript = text.trim();
        if transcript.contains(NO_SPEECH_SENTINEL) {
            info!("Gemini reported no speech");
            return Ok(String::new());
        }
        info!(chars = transcript.len(), "Gemini transcription complete");
        Ok(transcript.to_string())
    }
}

/// Reply generation with the tutor persona as system instruction.
pub struct GeminiResponder {
    client: GeminiClient,
}

impl GeminiResponder {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client: GeminiClient {
                http,
                api_key,
                model,
                base_url: GEMINI_BASE_URL.to_string(),
            },
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }
}

fn build_reply_request(prompt: &ReplyPrompt) -> GenerateContentRequest {
    let mut contents = Vec::with_capacity(prompt.history.len() * 2 + 1);
    for turn in &prompt.history {
        contents.push(Content::text(Some("user"), turn.user.as_str()));
        contents.push(Content::text(Some("model"), turn.assistant.as_str()));
    }
    contents.push(Content::text(Some("user"), prompt.user_text.as_str()));

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content::text(None, prompt.system.as_str())),
        // Exam topics (biology, history) trip the default filters too often.
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category: category.to_string(),
                threshold: "BLOCK_NONE".to_string(),
            })
            .collect(),
        generation_config: GenerationConfig {
            temperature: 0.7,
            max_output_tokens: 400,
        },
    }
}

#[async_trait]
impl Responder for GeminiResponder {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn respond(&self, prompt: &ReplyPrompt) -> ProviderOutcome<String> {
        debug!(history = prompt.history.len(), "Requesting Gemini reply");
        self.client.generate(&build_reply_request(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::conversation::ChatTurn;

    fn parse(json: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_reply_request_shape() {
        let prompt = ReplyPrompt {
            system: "You are a tutor.".into(),
            history: vec![ChatTurn::new("hi", "hello")],
            user_text: "What is osmosis?".into(),
        };
        let json = serde_json::to_value(build_reply_request(&prompt)).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are a tutor.");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "What is osmosis?");
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let body = parse(serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Water " }, { "text": "moves." }] },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(candidate_text(body).unwrap(), "Water moves.");
    }

    #[test]
    fn test_prompt_block_is_fatal() {
        let body = parse(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }));
        assert!(matches!(candidate_text(body), Err(ProviderError::Fatal(_))));
    }

    #[test]
    fn test_safety_finish_reason_is_fatal() {
        let body = parse(serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }));
        assert!(matches!(candidate_text(body), Err(ProviderError::Fatal(_))));
    }

    #[test]
    fn test_empty_candidates_are_fatal() {
        let body = parse(serde_json::json!({ "candidates": [] }));
        assert!(matches!(candidate_text(body), Err(ProviderError::Fatal(_))));
    }

    #[test]
    fn test_transcriber_instruction_mentions_sentinel() {
        let t = GeminiTranscriber::new(
            reqwest::Client::new(),
            "key".into(),
            "model".into(),
            "en".into(),
        );
        let instruction = t.instruction();
        assert!(instruction.contains(NO_SPEECH_SENTINEL));
        assert!(instruction.contains("'en'"));
    }
}
