//! Upstream provider adapters for the three pipeline stages.
//!
//! Adapters share a single `reqwest::Client` built once at startup, so the
//! provider timeout and connection pool are configured in one place.

pub mod deepgram;
pub mod gemini;
pub mod google_tts;

use crate::config::{Config, ConfigError, Provider};
use async_openai::config::OpenAIConfig;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};
use tutor_core::{
    error::{ProviderError, ProviderOutcome},
    openai_compat::OpenAICompatibleResponder,
    stages::{Responder, Synthesizer, Transcriber},
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Builds the HTTP client every adapter uses.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
}

fn require(key: &Option<String>, name: &str) -> Result<String, ConfigError> {
    key.clone()
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

/// Picks the transcription strategy: Deepgram when configured, Gemini otherwise.
pub fn build_transcriber(
    config: &Config,
    http: reqwest::Client,
) -> Result<Arc<dyn Transcriber>, ConfigError> {
    if let Some(api_key) = &config.deepgram_api_key {
        info!(model = %config.deepgram_model, "Using Deepgram transcription.");
        return Ok(Arc::new(deepgram::DeepgramTranscriber::new(
            http,
            api_key.clone(),
            config.deepgram_model.clone(),
            config.transcribe_language.clone(),
        )));
    }

    info!(model = %config.transcribe_model, "DEEPGRAM_API_KEY not set, using Gemini transcription.");
    Ok(Arc::new(gemini::GeminiTranscriber::new(
        http,
        require(&config.gemini_api_key, "GEMINI_API_KEY")?,
        config.transcribe_model.clone(),
        config.transcribe_language.clone(),
    )))
}

/// Builds the reply generator for the configured chat provider.
pub fn build_responder(
    config: &Config,
    http: reqwest::Client,
) -> Result<Arc<dyn Responder>, ConfigError> {
    match config.chat_provider {
        Provider::Gemini => {
            info!(model = %config.chat_model, "Using Gemini chat provider.");
            Ok(Arc::new(gemini::GeminiResponder::new(
                http,
                require(&config.gemini_api_key, "GEMINI_API_KEY")?,
                config.chat_model.clone(),
            )))
        }
        Provider::OpenAI => {
            info!(model = %config.chat_model, "Using OpenAI chat provider.");
            let openai_config = OpenAIConfig::new()
                .with_api_key(require(&config.openai_api_key, "OPENAI_API_KEY")?)
                .with_api_base(OPENAI_BASE_URL);
            Ok(Arc::new(OpenAICompatibleResponder::new(
                openai_config,
                config.chat_model.clone(),
                http,
            )))
        }
    }
}

pub fn build_synthesizer(
    config: &Config,
    http: reqwest::Client,
) -> Result<Arc<dyn Synthesizer>, ConfigError> {
    Ok(Arc::new(google_tts::GoogleTtsSynthesizer::new(
        http,
        require(&config.google_tts_api_key, "GOOGLE_TTS_API_KEY")?,
        config.tts_voice.clone(),
        config.tts_language_code.clone(),
    )))
}

/// Maps a transport failure to a provider outcome, logging the cause.
pub(crate) fn send_error(provider: &'static str, err: reqwest::Error) -> ProviderError {
    error!(provider, error = %err, "Provider request failed");
    ProviderError::from_reqwest(provider, &err)
}

/// Passes 2xx responses through; anything else becomes a classified error.
///
/// The raw body is logged here and kept as error detail, but never reaches
/// the student.
pub(crate) async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> ProviderOutcome<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(provider, status = %status, body = %body, "Provider API error");
    Err(ProviderError::from_status(
        status.as_u16(),
        format!("{provider} API error {status}: {body}"),
    ))
}

/// Decodes a JSON body; undecodable payloads are fatal.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> ProviderOutcome<T> {
    response.json::<T>().await.map_err(|e| {
        error!(provider, error = %e, "Failed to parse provider response");
        ProviderError::from_reqwest(provider, &e)
    })
}
