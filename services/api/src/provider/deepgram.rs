//! Primary transcription strategy: Deepgram prerecorded audio.

use super::{check_status, read_json, send_error};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use tutor_core::{error::ProviderOutcome, stages::Transcriber};

const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com";
const PROVIDER: &str = "deepgram";

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Debug, Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

pub struct DeepgramTranscriber {
    http: reqwest::Client,
    api_key: String,
    model: String,
    language: String,
    base_url: String,
}

impl DeepgramTranscriber {
    pub fn new(http: reqwest::Client, api_key: String, model: String, language: String) -> Self {
        Self {
            http,
            api_key,
            model,
            language,
            base_url: DEEPGRAM_BASE_URL.to_string(),
        }
    }

    /// Points the adapter at a different host, e.g. a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> ProviderOutcome<String> {
        debug!(audio_bytes = audio.len(), mime_type, "Starting Deepgram transcription");

        // Verbatim output: keep filler words, no reformatting of numbers or dates.
        let response = self
            .http
            .post(format!("{}/v1/listen", self.base_url))
            .query(&[
                ("model", self.model.as_str()),
                ("language", self.language.as_str()),
                ("punctuate", "true"),
                ("smart_format", "false"),
                ("filler_words", "true"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", mime_type)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| send_error(PROVIDER, e))?;

        let response = check_status(PROVIDER, response).await?;
        let result: DeepgramResponse = read_json(PROVIDER, response).await?;

        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default();

        info!(chars = transcript.len(), "Deepgram transcription complete");
        Ok(transcript)
    }
}
