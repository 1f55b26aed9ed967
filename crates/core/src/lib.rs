//! Core of the voice-turn tutor pipeline.
//!
//! Everything here is transport-agnostic: the HTTP service and the client
//! both depend on these types, the error taxonomy, and the retry policy.

pub mod conversation;
pub mod error;
pub mod openai_compat;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod stages;
pub mod turn;
pub mod wire;

pub use conversation::{ChatTurn, ConversationHistory, ExamContext, HISTORY_LIMIT};
pub use error::{Disposition, ErrorKind, ProviderError, ProviderOutcome, TurnError, classify};
pub use orchestrator::TurnOrchestrator;
pub use retry::{RetryPolicy, retry};
pub use turn::{TurnPayload, VoiceTurnRequest, VoiceTurnResult};
