//! Pipeline Stage Contracts
//!
//! The three provider-backed stages of a voice turn. Concrete adapters are
//! chosen once at startup and injected into the [`crate::orchestrator::TurnOrchestrator`].

use crate::{error::ProviderOutcome, prompt::ReplyPrompt};
use async_trait::async_trait;

/// Converts recorded audio into text.
///
/// An empty string means "no speech detected" and is a successful outcome;
/// provider errors must never be reported as an empty transcript.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Transcribes `audio` verbatim. `mime_type` is already normalized.
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> ProviderOutcome<String>;
}

/// Generates the tutor's reply text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Responder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the generated reply. Empty or safety-blocked output is a
    /// [`crate::error::ProviderError::Fatal`], never an empty success.
    async fn respond(&self, prompt: &ReplyPrompt) -> ProviderOutcome<String>;
}

/// Converts reply text into compressed speech audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str) -> ProviderOutcome<Vec<u8>>;
}
