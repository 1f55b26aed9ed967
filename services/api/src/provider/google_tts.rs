use super::{check_status, read_json, send_error};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use tutor_core::{
    error::{ProviderError, ProviderOutcome},
    stages::Synthesizer,
};

const GOOGLE_TTS_BASE_URL: &str = "https://texttospeech.googleapis.com";
const PROVIDER: &str = "google-tts";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

/// Google Cloud Text-to-Speech, returning MP3 bytes.
pub struct GoogleTtsSynthesizer {
    http: reqwest::Client,
    api_key: String,
    voice: String,
    language_code: String,
    base_url: String,
}

impl GoogleTtsSynthesizer {
    pub fn new(http: reqwest::Client, api_key: String, voice: String, language_code: String) -> Self {
        Self {
            http,
            api_key,
            voice,
            language_code,
            base_url: GOOGLE_TTS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Synthesizer for GoogleTtsSynthesizer {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn synthesize(&self, text: &str) -> ProviderOutcome<Vec<u8>> {
        debug!(chars = text.len(), voice = %self.voice, "Starting speech synthesis");
        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.language_code,
                name: &self.voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/text:synthesize", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(PROVIDER, e))?;

        let response = check_status(PROVIDER, response).await?;
        let body: SynthesizeResponse = read_json(PROVIDER, response).await?;

        let audio = STANDARD.decode(body.audio_content.as_bytes()).map_err(|e| {
            error!(error = %e, "Synthesized audio was not valid base64");
            ProviderError::Fatal(format!("invalid audioContent: {e}"))
        })?;
        if audio.is_empty() {
            return Err(ProviderError::Fatal("synthesis returned no audio".into()));
        }

        info!(audio_bytes = audio.len(), "Speech synthesis complete");
        Ok(audio)
    }
}
