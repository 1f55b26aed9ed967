//! Conversation Primitives
//!
//! Completed exchanges (`ChatTurn`), the bounded history fed to the responder
//! as grounding context, and the static exam metadata for a practice session.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of completed exchanges kept as generation context.
pub const HISTORY_LIMIT: usize = 10;

/// One completed user/assistant exchange. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatTurn {
    #[cfg_attr(feature = "openapi", schema(example = "What is photosynthesis?"))]
    pub user: String,
    pub assistant: String,
}

impl ChatTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Chronological log of the most recent exchanges, oldest first.
///
/// Appending beyond [`HISTORY_LIMIT`] evicts from the front. On the wire and
/// on disk the history is a plain JSON array of `{user, assistant}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ChatTurn>", into = "Vec<ChatTurn>")]
pub struct ConversationHistory {
    turns: VecDeque<ChatTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a history from an arbitrary list, keeping only the most recent turns.
    pub fn from_turns(turns: impl IntoIterator<Item = ChatTurn>) -> Self {
        let mut history = Self::new();
        for turn in turns {
            history.push(turn);
        }
        history
    }

    /// Appends a turn, evicting the oldest one when the bound is exceeded.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > HISTORY_LIMIT {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    /// Copies the turns out as a snapshot, e.g. for a request payload.
    pub fn to_vec(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }
}

impl From<Vec<ChatTurn>> for ConversationHistory {
    fn from(turns: Vec<ChatTurn>) -> Self {
        Self::from_turns(turns)
    }
}

impl From<ConversationHistory> for Vec<ChatTurn> {
    fn from(history: ConversationHistory) -> Self {
        history.turns.into()
    }
}

/// Static session metadata that grounds the tutor persona.
///
/// Supplied by the question-content collaborator and immutable for the
/// lifetime of a practice session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ExamContext {
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "GCSE"))]
    pub exam_type: String,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "Biology"))]
    pub subject: String,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(example = "Photosynthesis"))]
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl ExamContext {
    pub fn new(
        exam_type: impl Into<String>,
        subject: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            exam_type: exam_type.into(),
            subject: subject.into(),
            topic: topic.into(),
            difficulty: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }
}
