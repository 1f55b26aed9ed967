use crate::{
    error::{ProviderError, ProviderOutcome},
    prompt::ReplyPrompt,
    stages::Responder,
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FinishReason,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tracing::{debug, error};

/// A [`Responder`] for any OpenAI-compatible chat completion API.
pub struct OpenAICompatibleResponder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleResponder {
    /// Creates a responder for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the service.
    /// * `model` - Chat model identifier (e.g., "gpt-4o-mini").
    /// * `http` - Shared HTTP client carrying the provider timeout.
    ///
    /// The client's own backoff is disabled: each `respond` is a single
    /// upstream request, and retries belong to the caller's `RetryPolicy`.
    pub fn new(config: OpenAIConfig, model: impl Into<String>, http: reqwest::Client) -> Self {
        let single_attempt = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        Self {
            client: Client::with_config(config)
                .with_http_client(http)
                .with_backoff(single_attempt),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Responder for OpenAICompatibleResponder {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn respond(&self, prompt: &ReplyPrompt) -> ProviderOutcome<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(build_messages(prompt).map_err(|e| classify_openai_error(&e))?)
            .build()
            .map_err(|e| classify_openai_error(&e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!(error = %e, "OpenAI chat completion failed");
            classify_openai_error(&e)
        })?;
        extract_reply(response)
    }
}

/// System message, then alternating user/assistant history, then the new utterance.
fn build_messages(prompt: &ReplyPrompt) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages = Vec::with_capacity(prompt.history.len() * 2 + 2);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()?
            .into(),
    );
    for turn in &prompt.history {
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(turn.user.as_str())
                .build()?
                .into(),
        );
        messages.push(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.assistant.as_str())
                .build()?
                .into(),
        );
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user_text.as_str())
            .build()?
            .into(),
    );
    Ok(messages)
}

fn extract_reply(response: CreateChatCompletionResponse) -> ProviderOutcome<String> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProviderError::Fatal("chat completion returned no choices".into()));
    };
    if choice.finish_reason == Some(FinishReason::ContentFilter) {
        return Err(ProviderError::Fatal("reply blocked by content filter".into()));
    }
    match choice.message.content {
        Some(text) if !text.trim().is_empty() => {
            debug!(chars = text.len(), "OpenAI reply received");
            Ok(text)
        }
        _ => Err(ProviderError::Fatal("chat completion had no text content".into())),
    }
}

/// Error types and codes OpenAI documents for throttling and overload.
const TRANSIENT_ERROR_TYPES: &[&str] = &["requests", "tokens", "rate_limit_error", "server_error"];
const TRANSIENT_ERROR_CODES: &[&str] = &["rate_limit_exceeded", "server_error"];

fn classify_openai_error(err: &OpenAIError) -> ProviderError {
    match err {
        OpenAIError::Reqwest(e) => ProviderError::from_reqwest("openai", e),
        // 5xx responses surface with no type or code, carrying the raw body.
        OpenAIError::ApiError(api) if api.r#type.is_none() && api.code.is_none() => {
            ProviderError::Transient(api.message.clone())
        }
        OpenAIError::ApiError(api) if is_transient_api_error(api) => {
            ProviderError::Transient(api.message.clone())
        }
        OpenAIError::ApiError(api) => ProviderError::Fatal(api.message.clone()),
        other => ProviderError::Fatal(other.to_string()),
    }
}

fn is_transient_api_error(api: &ApiError) -> bool {
    api.r#type
        .as_deref()
        .is_some_and(|t| TRANSIENT_ERROR_TYPES.contains(&t))
        || api
            .code
            .as_deref()
            .is_some_and(|c| TRANSIENT_ERROR_CODES.contains(&c))
}
