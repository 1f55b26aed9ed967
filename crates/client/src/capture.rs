//! Capture sources: where a student's utterance comes from.
//!
//! A source either records audio (stopped by the user or the engine) or runs
//! live recognition and hands back a transcript. Only the
//! [`crate::controller::TurnController`] drives a source.

use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tracing::debug;
use tutor_core::error::ErrorKind;

/// Signals a source reports while capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Interim recognition text.
    Partial(String),
    /// Silence timeout from a live recognizer.
    EndOfSpeech,
    /// The recognizer gave up without a match.
    NoMatch,
    /// The engine finished on its own.
    Completed,
    /// The engine failed mid-capture.
    Error(String),
}

impl CaptureEvent {
    /// Whether this event ends the capture.
    pub fn is_end_of_capture(&self) -> bool {
        matches!(
            self,
            CaptureEvent::EndOfSpeech | CaptureEvent::NoMatch | CaptureEvent::Completed
        )
    }
}

/// What a finished capture produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Utterance {
    Audio {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    Transcript(String),
}

impl Utterance {
    pub fn is_empty(&self) -> bool {
        match self {
            Utterance::Audio { bytes, .. } => bytes.is_empty(),
            Utterance::Transcript(text) => text.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CaptureError::Failed(_) => ErrorKind::CaptureFailed,
        }
    }
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Checks (or prompts for) access to the capture device.
    async fn request_permission(&self) -> Result<(), CaptureError>;

    /// Starts capturing. Progress and end-of-speech signals go to `events`.
    async fn start(&self, events: UnboundedSender<CaptureEvent>) -> Result<(), CaptureError>;

    /// Stops capturing, releases the device, and returns what was captured.
    async fn finish(&self) -> Result<Utterance, CaptureError>;

    /// Abandons the capture and releases the device. Never fails.
    async fn cancel(&self);
}

/// Best-effort MIME type from a recording's file extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "m4a" => Some("audio/m4a"),
        "mp4" => Some("audio/mp4"),
        "aac" => Some("audio/aac"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "ogg" | "oga" => Some("audio/ogg"),
        "webm" => Some("audio/webm"),
        "flac" => Some("audio/flac"),
        _ => None,
    }
}

/// Recording mode backed by an audio file: "recording" ends when the user stops.
pub struct AudioFileCapture {
    path: PathBuf,
    mime_type: Option<String>,
    events: Mutex<Option<UnboundedSender<CaptureEvent>>>,
}

impl AudioFileCapture {
    pub fn new(path: impl Into<PathBuf>, mime_type: Option<String>) -> Self {
        let path = path.into();
        let mime_type = mime_type.or_else(|| mime_for_path(&path).map(str::to_string));
        Self {
            path,
            mime_type,
            events: Mutex::new(None),
        }
    }

    fn release(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.take();
        }
    }
}

#[async_trait]
impl CaptureSource for AudioFileCapture {
    async fn request_permission(&self) -> Result<(), CaptureError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(CaptureError::Failed(format!(
                "{} is not a file",
                self.path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(
                CaptureError::PermissionDenied(format!("{}: {e}", self.path.display())),
            ),
            Err(e) => Err(CaptureError::Failed(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn start(&self, events: UnboundedSender<CaptureEvent>) -> Result<(), CaptureError> {
        let mut slot = self
            .events
            .lock()
            .map_err(|_| CaptureError::Failed("capture state poisoned".into()))?;
        if slot.is_some() {
            return Err(CaptureError::Failed("capture already running".into()));
        }
        *slot = Some(events);
        debug!(path = %self.path.display(), "Recording started");
        Ok(())
    }

    async fn finish(&self) -> Result<Utterance, CaptureError> {
        self.release();
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::Failed(format!("{}: {e}", self.path.display())))?;
        debug!(bytes = bytes.len(), "Recording finished");
        Ok(Utterance::Audio {
            bytes,
            mime_type: self.mime_type.clone(),
        })
    }

    async fn cancel(&self) {
        self.release();
    }
}

/// Live-recognition mode that "hears" a fixed sentence.
///
/// Like real recognizers it emits interim results, then a completion, then a
/// redundant no-match for the same end of speech.
pub struct ScriptedTranscriptCapture {
    text: String,
    word_delay: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptedTranscriptCapture {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            word_delay: Duration::from_millis(40),
            task: Mutex::new(None),
        }
    }

    pub fn with_word_delay(mut self, word_delay: Duration) -> Self {
        self.word_delay = word_delay;
        self
    }

    fn abort(&self) {
        if let Some(task) = self.task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
    }
}

#[async_trait]
impl CaptureSource for ScriptedTranscriptCapture {
    async fn request_permission(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn start(&self, events: UnboundedSender<CaptureEvent>) -> Result<(), CaptureError> {
        let words: Vec<String> = self.text.split_whitespace().map(str::to_string).collect();
        let delay = self.word_delay;

        let task = tokio::spawn(async move {
            let mut heard = String::new();
            for word in words {
                tokio::time::sleep(delay).await;
                if !heard.is_empty() {
                    heard.push(' ');
                }
                heard.push_str(&word);
                if events.send(CaptureEvent::Partial(heard.clone())).is_err() {
                    return;
                }
            }
            tokio::time::sleep(delay).await;
            let _ = events.send(CaptureEvent::Completed);
            let _ = events.send(CaptureEvent::NoMatch);
        });

        self.abort();
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    async fn finish(&self) -> Result<Utterance, CaptureError> {
        self.abort();
        Ok(Utterance::Transcript(self.text.trim().to_string()))
    }

    async fn cancel(&self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("q.M4A")), Some("audio/m4a"));
        assert_eq!(mime_for_path(Path::new("q.mp3")), Some("audio/mpeg"));
        assert_eq!(mime_for_path(Path::new("q.txt")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
    }

    #[test]
    fn test_end_of_capture_events() {
        assert!(CaptureEvent::EndOfSpeech.is_end_of_capture());
        assert!(CaptureEvent::NoMatch.is_end_of_capture());
        assert!(CaptureEvent::Completed.is_end_of_capture());
        assert!(!CaptureEvent::Partial("hi".into()).is_end_of_capture());
        assert!(!CaptureEvent::Error("boom".into()).is_end_of_capture());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CaptureError::PermissionDenied("no".into()).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(CaptureError::Failed("no".into()).kind(), ErrorKind::CaptureFailed);
    }

    #[test]
    fn test_empty_utterances() {
        assert!(Utterance::Transcript("  ".into()).is_empty());
        assert!(
            Utterance::Audio {
                bytes: vec![],
                mime_type: None
            }
            .is_empty()
        );
        assert!(!Utterance::Transcript("hi".into()).is_empty());
    }

    #[tokio::test]
    async fn test_scripted_capture_emits_redundant_end_signals() {
        let capture = ScriptedTranscriptCapture::new("what is osmosis")
            .with_word_delay(Duration::from_millis(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        capture.start(tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                CaptureEvent::Partial("what".into()),
                CaptureEvent::Partial("what is".into()),
                CaptureEvent::Partial("what is osmosis".into()),
                CaptureEvent::Completed,
                CaptureEvent::NoMatch,
            ]
        );
        assert_eq!(
            capture.finish().await.unwrap(),
            Utterance::Transcript("what is osmosis".into())
        );
    }

    #[tokio::test]
    async fn test_audio_file_capture_reads_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turn.m4a");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let capture = AudioFileCapture::new(&path, None);
        capture.request_permission().await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        capture.start(tx).await.unwrap();

        assert_eq!(
            capture.finish().await.unwrap(),
            Utterance::Audio {
                bytes: vec![1, 2, 3],
                mime_type: Some("audio/m4a".into())
            }
        );
    }

    #[tokio::test]
    async fn test_audio_file_capture_missing_file() {
        let capture = AudioFileCapture::new("/definitely/not/here.m4a", None);
        assert!(matches!(
            capture.request_permission().await,
            Err(CaptureError::Failed(_))
        ));
    }
}
