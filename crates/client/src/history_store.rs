use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tutor_core::conversation::ConversationHistory;

/// Durable storage for the bounded conversation history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<ConversationHistory>;

    async fn save(&self, history: &ConversationHistory) -> anyhow::Result<()>;
}

/// Stores the history as a pretty-printed JSON array of `{user, assistant}`.
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self) -> anyhow::Result<ConversationHistory> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConversationHistory::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, history: &ConversationHistory) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(history)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
