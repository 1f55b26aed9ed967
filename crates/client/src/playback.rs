use async_trait::async_trait;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU32, Ordering},
};
use tracing::info;

/// Speaker output for reply audio.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Plays `audio`, resolving when playback ends naturally or is stopped.
    async fn play(&self, audio: &[u8]) -> anyhow::Result<()>;

    /// Interrupts any active playback immediately.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Writes each reply to `reply-<n>.mp3` in a directory instead of playing it.
pub struct FilePlaybackSink {
    dir: PathBuf,
    counter: AtomicU32,
}

impl FilePlaybackSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PlaybackSink for FilePlaybackSink {
    async fn play(&self, audio: &[u8]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("reply-{n}.mp3"));
        tokio::fs::write(&path, audio).await?;
        info!(path = %path.display(), bytes = audio.len(), "Reply audio written");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
