//! Turn Orchestrator
//!
//! Runs Transcriber → Responder → Synthesizer for one request, strictly in
//! that order. Transcription and reply generation are required; synthesis is
//! best-effort and its failure only drops the audio from the result.

use crate::{
    conversation::{ChatTurn, ExamContext},
    error::{ErrorKind, TurnError},
    prompt::{EMPTY_UTTERANCE_REPLY, PromptBuilder, speakable},
    retry::{RetryPolicy, retry},
    stages::{Responder, Synthesizer, Transcriber},
    turn::{TurnPayload, VoiceTurnRequest, VoiceTurnResult},
};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Validation message for a voice turn without audio.
pub const NO_AUDIO_MESSAGE: &str = "No audio file uploaded";
/// Validation message for a synthesis request without text.
pub const NO_TEXT_MESSAGE: &str = "No text provided";
/// MIME type assumed when the client did not label its recording.
pub const DEFAULT_AUDIO_MIME: &str = "audio/aac";

/// Sequences the three provider stages for one turn.
///
/// All collaborators are injected, so tests can swap in deterministic stubs.
pub struct TurnOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn Responder>,
    synthesizer: Arc<dyn Synthesizer>,
    prompts: PromptBuilder,
    retry: RetryPolicy,
}

impl TurnOrchestrator {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn Responder>,
        synthesizer: Arc<dyn Synthesizer>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            transcriber,
            responder,
            synthesizer,
            prompts,
            retry: RetryPolicy::new(2, Duration::from_millis(500)),
        }
    }

    /// Overrides the policy used for transient upstream failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs a full turn and composes the result.
    ///
    /// An empty transcript short-circuits with the canned retry prompt
    /// without calling the responder or the synthesizer.
    #[instrument(name = "voice_turn", skip_all, fields(turn_id = %Uuid::new_v4()))]
    pub async fn run(&self, request: VoiceTurnRequest) -> Result<VoiceTurnResult, TurnError> {
        let VoiceTurnRequest {
            payload,
            history,
            exam_context,
            question_text,
            working_space,
        } = request;

        let transcript = match payload {
            TurnPayload::Audio { bytes, mime_type } => {
                self.transcribe(&bytes, mime_type.as_deref()).await?
            }
            TurnPayload::Text(text) => text.trim().to_string(),
        };

        if transcript.is_empty() {
            info!("Empty utterance, returning retry prompt");
            return Ok(VoiceTurnResult {
                transcript: String::new(),
                reply_text: EMPTY_UTTERANCE_REPLY.to_string(),
                audio_bytes: Vec::new(),
            });
        }

        let reply_text = self
            .generate_reply(
                &transcript,
                &history,
                &exam_context,
                question_text.as_deref(),
                working_space.as_deref(),
            )
            .await?;

        let audio_bytes = match self.synthesizer.synthesize(&reply_text).await {
            Ok(audio) => audio,
            Err(err) => {
                warn!(
                    synthesizer = self.synthesizer.name(),
                    error = %err,
                    "Synthesis failed, returning text-only reply"
                );
                Vec::new()
            }
        };

        info!(
            transcript_chars = transcript.len(),
            reply_chars = reply_text.len(),
            audio_bytes = audio_bytes.len(),
            "Voice turn complete"
        );
        Ok(VoiceTurnResult {
            transcript,
            reply_text,
            audio_bytes,
        })
    }

    /// Transcribes audio; an empty string means no speech was detected.
    pub async fn transcribe(&self, audio: &[u8], mime_type: Option<&str>) -> Result<String, TurnError> {
        if audio.is_empty() {
            return Err(TurnError::validation(NO_AUDIO_MESSAGE));
        }
        let mime_type = mime_type.unwrap_or(DEFAULT_AUDIO_MIME);

        let transcript = retry(&self.retry, "transcribe", || {
            self.transcriber.transcribe(audio, mime_type)
        })
        .await
        .inspect_err(|err| {
            warn!(transcriber = self.transcriber.name(), error = %err, "Transcription failed");
        })?;

        Ok(transcript.trim().to_string())
    }

    /// Text-in reply without synthesis. Blank input yields the canned retry prompt.
    #[instrument(name = "chat_turn", skip_all, fields(turn_id = %Uuid::new_v4()))]
    pub async fn reply(
        &self,
        user_text: &str,
        history: &[ChatTurn],
        exam_context: &ExamContext,
        question_text: Option<&str>,
        working_space: Option<&str>,
    ) -> Result<String, TurnError> {
        if user_text.trim().is_empty() {
            info!("Empty chat message, returning retry prompt");
            return Ok(EMPTY_UTTERANCE_REPLY.to_string());
        }
        self.generate_reply(user_text, history, exam_context, question_text, working_space)
            .await
    }

    /// Synthesizes speech for arbitrary text.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::validation(NO_TEXT_MESSAGE));
        }
        let audio = retry(&self.retry, "synthesize", || self.synthesizer.synthesize(text))
            .await
            .inspect_err(|err| {
                warn!(synthesizer = self.synthesizer.name(), error = %err, "Synthesis failed");
            })?;
        Ok(audio)
    }

    async fn generate_reply(
        &self,
        user_text: &str,
        history: &[ChatTurn],
        exam_context: &ExamContext,
        question_text: Option<&str>,
        working_space: Option<&str>,
    ) -> Result<String, TurnError> {
        let prompt = self
            .prompts
            .build(user_text, history, exam_context, question_text, working_space);

        let raw = retry(&self.retry, "respond", || self.responder.respond(&prompt))
            .await
            .inspect_err(|err| {
                warn!(responder = self.responder.name(), error = %err, "Reply generation failed");
            })?;

        let reply = speakable(&raw);
        if reply.is_empty() {
            return Err(TurnError::new(
                ErrorKind::ProviderFatal,
                format!("{} produced no speakable text", self.responder.name()),
            ));
        }
        Ok(reply)
    }
}
