//! Turn State Machine
//!
//! `TurnController` is the single owner of the capture source and the
//! playback sink. All state lives in one `Core` behind a mutex; every
//! transition is applied there, checked against the disposed flag and the
//! current capture epoch, and then published to observers while the lock is
//! still held, so observers always see transitions in order.
//!
//! Observers run synchronously and must not call back into the controller.

use crate::{
    capture::{CaptureEvent, CaptureSource, Utterance},
    orchestration::OrchestrationClient,
    playback::PlaybackSink,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tutor_core::{
    conversation::{ConversationHistory, ExamContext},
    error::ErrorKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Idle,
    Capturing,
    Processing,
    Playing,
    Error,
}

/// What observers see after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSnapshot {
    pub state: TurnState,
    /// Interim recognition text while capturing.
    pub partial_transcript: String,
    pub transcript: String,
    pub reply_text: String,
    /// Student-facing message, set only in [`TurnState::Error`].
    pub error: Option<String>,
}

impl Default for TurnSnapshot {
    fn default() -> Self {
        Self {
            state: TurnState::Idle,
            partial_transcript: String::new(),
            transcript: String::new(),
            reply_text: String::new(),
            error: None,
        }
    }
}

impl TurnSnapshot {
    fn fail(&mut self, kind: ErrorKind) {
        self.state = TurnState::Error;
        self.error = Some(kind.user_message().to_string());
    }
}

/// Once-only guard for the end of a capture.
///
/// Each capture arms a fresh epoch. Of all the end-of-capture triggers for
/// that epoch (user stop, silence timeout, no-match, engine completion) only
/// the first `trip` returns `true`; triggers carrying a stale epoch never win.
#[derive(Debug, Default)]
pub struct CaptureLatch {
    epoch: u64,
    tripped: bool,
}

impl CaptureLatch {
    pub fn arm(&mut self) -> u64 {
        self.epoch += 1;
        self.tripped = false;
        self.epoch
    }

    pub fn trip(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.tripped {
            return false;
        }
        self.tripped = true;
        true
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

pub type Observer = Box<dyn Fn(&TurnSnapshot) + Send + Sync>;

struct Core {
    snapshot: TurnSnapshot,
    latch: CaptureLatch,
    starting: bool,
    disposed: bool,
    observers: Vec<Observer>,
}

impl Core {
    fn notify(&self) {
        for observer in &self.observers {
            observer(&self.snapshot);
        }
    }
}

/// Per-session context the controller hands to the orchestration client.
struct Session {
    history: ConversationHistory,
    exam_context: ExamContext,
    question_text: Option<String>,
    working_space: Option<String>,
}

struct Inner {
    core: Mutex<Core>,
    session: tokio::sync::Mutex<Session>,
    client: OrchestrationClient,
    capture: Arc<dyn CaptureSource>,
    playback: Arc<dyn PlaybackSink>,
}

#[derive(Clone)]
pub struct TurnController {
    inner: Arc<Inner>,
}

impl TurnController {
    pub fn new(
        client: OrchestrationClient,
        capture: Arc<dyn CaptureSource>,
        playback: Arc<dyn PlaybackSink>,
        history: ConversationHistory,
        exam_context: ExamContext,
    ) -> Self {
        let core = Core {
            snapshot: TurnSnapshot::default(),
            latch: CaptureLatch::default(),
            starting: false,
            disposed: false,
            observers: Vec::new(),
        };
        let session = Session {
            history,
            exam_context,
            question_text: None,
            working_space: None,
        };
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(core),
                session: tokio::sync::Mutex::new(session),
                client,
                capture,
                playback,
            }),
        }
    }

    pub fn subscribe(&self, observer: impl Fn(&TurnSnapshot) + Send + Sync + 'static) {
        let mut core = self.inner.lock();
        if !core.disposed {
            core.observers.push(Box::new(observer));
        }
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub async fn history(&self) -> ConversationHistory {
        self.inner.session.lock().await.history.clone()
    }

    /// Sets the question on screen and the student's working notes, used as
    /// extra context for text turns.
    pub async fn set_question(&self, question_text: Option<String>, working_space: Option<String>) {
        let mut session = self.inner.session.lock().await;
        session.question_text = question_text;
        session.working_space = working_space;
    }

    /// Begins capturing. Allowed from `Idle` and `Error`; ignored otherwise.
    pub async fn start(&self) {
        let epoch = {
            let mut core = self.inner.lock();
            let state = core.snapshot.state;
            if core.disposed
                || core.starting
                || !matches!(state, TurnState::Idle | TurnState::Error)
            {
                debug!(?state, "Start ignored");
                return;
            }
            core.starting = true;
            core.latch.arm()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let started = match self.inner.capture.request_permission().await {
            Ok(()) => self.inner.capture.start(tx).await,
            Err(e) => Err(e),
        };

        let live = {
            let mut core = self.inner.lock();
            core.starting = false;
            let live = !core.disposed && core.latch.epoch() == epoch;
            if live {
                match &started {
                    Ok(()) => {
                        core.snapshot = TurnSnapshot {
                            state: TurnState::Capturing,
                            ..TurnSnapshot::default()
                        };
                    }
                    Err(e) => core.snapshot.fail(e.kind()),
                }
                core.notify();
            }
            live
        };

        match started {
            Ok(()) if live => {
                info!(epoch, "Capture started");
                Inner::listen(&self.inner, epoch, rx);
            }
            Ok(()) => self.inner.capture.cancel().await,
            Err(e) => warn!(error = %e, "Capture could not start"),
        }
    }

    /// User-initiated stop: ends a capture, or interrupts playback.
    pub async fn stop(&self) {
        let (state, epoch) = {
            let core = self.inner.lock();
            if core.disposed {
                return;
            }
            (core.snapshot.state, core.latch.epoch())
        };

        match state {
            TurnState::Capturing => {
                Inner::end_capture(&self.inner, epoch);
            }
            TurnState::Playing => {
                if let Err(e) = self.inner.playback.stop().await {
                    warn!(error = %e, "Failed to stop playback");
                }
                self.inner
                    .transition(epoch, &[TurnState::Playing], |s| s.state = TurnState::Idle);
            }
            _ => debug!(?state, "Stop ignored"),
        }
    }

    /// Tears the controller down. No observer is notified after this starts.
    pub async fn dispose(&self) {
        let state = {
            let mut core = self.inner.lock();
            if core.disposed {
                return;
            }
            core.disposed = true;
            core.observers.clear();
            core.snapshot.state
        };
        info!(?state, "Disposing turn controller");

        self.inner.capture.cancel().await;
        if let Err(e) = self.inner.playback.stop().await {
            warn!(error = %e, "Failed to stop playback during disposal");
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `update` if the controller is live, `epoch` is current and the
    /// state is one of `from`. Returns whether it was applied.
    fn transition(
        &self,
        epoch: u64,
        from: &[TurnState],
        update: impl FnOnce(&mut TurnSnapshot),
    ) -> bool {
        let mut core = self.lock();
        if core.disposed || core.latch.epoch() != epoch || !from.contains(&core.snapshot.state) {
            return false;
        }
        update(&mut core.snapshot);
        core.notify();
        true
    }

    fn listen(self: &Arc<Self>, epoch: u64, mut events: mpsc::UnboundedReceiver<CaptureEvent>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    CaptureEvent::Partial(text) => {
                        inner.transition(epoch, &[TurnState::Capturing], |s| {
                            s.partial_transcript = text
                        });
                    }
                    CaptureEvent::Error(detail) => {
                        inner.fail_capture(epoch, &detail).await;
                        break;
                    }
                    end if end.is_end_of_capture() => {
                        debug!(epoch, ?end, "End of capture signalled");
                        Inner::end_capture(&inner, epoch);
                    }
                    other => debug!(epoch, ?other, "Capture event ignored"),
                }
            }
        });
    }

    /// Moves `Capturing` to `Processing` for the first trigger of `epoch`.
    fn end_capture(self: &Arc<Self>, epoch: u64) -> bool {
        {
            let mut core = self.lock();
            if core.disposed
                || core.snapshot.state != TurnState::Capturing
                || !core.latch.trip(epoch)
            {
                return false;
            }
            core.snapshot.state = TurnState::Processing;
            core.notify();
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.process(epoch).await });
        true
    }

    async fn fail_capture(&self, epoch: u64, detail: &str) {
        let failed = {
            let mut core = self.lock();
            if core.disposed
                || core.snapshot.state != TurnState::Capturing
                || !core.latch.trip(epoch)
            {
                false
            } else {
                core.snapshot.fail(ErrorKind::CaptureFailed);
                core.notify();
                true
            }
        };
        if failed {
            warn!(epoch, %detail, "Capture engine failed");
            self.capture.cancel().await;
        }
    }

    async fn process(&self, epoch: u64) {
        let utterance = match self.capture.finish().await {
            Ok(utterance) => utterance,
            Err(e) => {
                warn!(error = %e, "Capture could not be finished");
                self.transition(epoch, &[TurnState::Processing], |s| s.fail(e.kind()));
                return;
            }
        };

        if utterance.is_empty() {
            info!(epoch, "Empty utterance, back to idle");
            self.transition(epoch, &[TurnState::Processing], |s| {
                s.state = TurnState::Idle
            });
            return;
        }

        let outcome = {
            let mut session = self.session.lock().await;
            let Session {
                history,
                exam_context,
                question_text,
                working_space,
            } = &mut *session;
            match utterance {
                Utterance::Audio { bytes, mime_type } => {
                    self.client
                        .send_voice_turn(bytes, mime_type, history, exam_context)
                        .await
                }
                Utterance::Transcript(text) => {
                    self.client
                        .send_chat_turn(
                            &text,
                            history,
                            exam_context,
                            question_text.as_deref(),
                            working_space.as_deref(),
                        )
                        .await
                }
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                warn!(kind = ?err.kind, detail = %err.detail, "Turn failed");
                self.transition(epoch, &[TurnState::Processing], |s| s.fail(err.kind));
                return;
            }
        };

        let next = if result.has_audio() {
            TurnState::Playing
        } else {
            TurnState::Idle
        };
        let applied = self.transition(epoch, &[TurnState::Processing], |s| {
            s.state = next;
            s.transcript = result.transcript.clone();
            s.reply_text = result.reply_text.clone();
        });
        if !applied {
            debug!(epoch, "Turn result discarded");
            return;
        }
        if next != TurnState::Playing {
            return;
        }

        if let Err(e) = self.playback.play(&result.audio_bytes).await {
            warn!(error = %e, "Playback failed");
        }
        self.transition(epoch, &[TurnState::Playing], |s| s.state = TurnState::Idle);
    }
}
