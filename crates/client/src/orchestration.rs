//! Orchestration Client
//!
//! Turns one local utterance plus context into exactly one `VoiceTurnResult`.
//! Transient failures are retried with linear backoff; on success the
//! exchange is appended to the history and persisted.

use crate::{
    api::{TutorApi, VoiceTurnUpload},
    history_store::HistoryStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use tutor_core::{
    conversation::{ChatTurn, ConversationHistory, ExamContext},
    error::TurnError,
    retry::{RetryPolicy, retry},
    turn::VoiceTurnResult,
    wire::ChatRequest,
};

pub struct OrchestrationClient {
    api: Arc<dyn TutorApi>,
    store: Arc<dyn HistoryStore>,
    retry: RetryPolicy,
}

impl OrchestrationClient {
    pub fn new(api: Arc<dyn TutorApi>, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            api,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends recorded audio through the full server pipeline.
    pub async fn send_voice_turn(
        &self,
        audio: Vec<u8>,
        mime_type: Option<String>,
        history: &mut ConversationHistory,
        exam_context: &ExamContext,
    ) -> Result<VoiceTurnResult, TurnError> {
        let upload = VoiceTurnUpload {
            audio,
            mime_type,
            history: history.to_vec(),
            exam_context: exam_context.clone(),
        };

        let result = retry(&self.retry, "voice_turn", || self.api.voice_turn(&upload)).await?;
        self.record(history, &result).await;
        Ok(result)
    }

    /// Sends a text utterance (live recognition or typed), then fetches the
    /// reply audio from `/tts`. Missing audio never fails the turn.
    pub async fn send_chat_turn(
        &self,
        text: &str,
        history: &mut ConversationHistory,
        exam_context: &ExamContext,
        question_text: Option<&str>,
        working_space: Option<&str>,
    ) -> Result<VoiceTurnResult, TurnError> {
        let request = ChatRequest {
            user_text: text.to_string(),
            history: history.to_vec(),
            exam_context: exam_context.clone(),
            question_text: question_text.map(str::to_string),
            working_space: working_space.map(str::to_string),
        };

        let response = retry(&self.retry, "chat", || self.api.chat(&request)).await?;
        let transcript = text.trim().to_string();

        let audio_bytes = if transcript.is_empty() {
            Vec::new()
        } else {
            match self.api.synthesize(&response.reply_text).await {
                Ok(audio) => audio,
                Err(err) => {
                    warn!(error = %err, "Reply audio unavailable, continuing with text only");
                    Vec::new()
                }
            }
        };

        let result = VoiceTurnResult {
            transcript,
            reply_text: response.reply_text,
            audio_bytes,
        };
        self.record(history, &result).await;
        Ok(result)
    }

    /// Appends the exchange only when both sides are non-empty.
    async fn record(&self, history: &mut ConversationHistory, result: &VoiceTurnResult) {
        if result.transcript.trim().is_empty() || result.reply_text.trim().is_empty() {
            return;
        }
        history.push(ChatTurn::new(
            result.transcript.clone(),
            result.reply_text.clone(),
        ));
        if let Err(e) = self.store.save(history).await {
            warn!(error = %e, "Failed to persist conversation history");
        } else {
            info!(turns = history.len(), "Conversation history saved");
        }
    }
}
