//! Transcription session controller
//!
//! State machine tying model readiness, file selection and the two
//! producers together:
//!
//! ```text
//! IDLE → AWAITING_MODEL → IDLE → CLASSIFYING → {TRANSCRIBING | DECODING} → READY
//!                                                         └──────────────→ ERROR
//! ```
//!
//! Dispatch runs whenever the file or the model readiness changes and is
//! guarded so a given generation is dispatched at most once. Every file
//! selection bumps the generation and cancels the outstanding dispatch;
//! results for an older generation are discarded.

mod registry;

pub use registry::SessionRegistry;

use crate::intake::{classify_with, UploadedFile};
use crate::model::ModelLoader;
use crate::presenter::{render, ResultsPresenter, ViewMode};
use crate::producer::{ProduceError, Producers};
use chrono::Utc;
use serde::Serialize;
use sonic_common::config::ExtensionRule;
use sonic_common::events::{
    EventBus, FailureKind, ModelReadiness, ProducerKind, ScribeEvent, SessionPhase,
};
use sonic_common::NoteSequence;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Session operation errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Retry requested outside the ERROR phase
    #[error("Nothing to retry in phase {0}")]
    NotRetryable(SessionPhase),
}

/// Recorded failure of the last attempt
#[derive(Debug, Clone, Serialize)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub model_readiness: ModelReadiness,
    pub file_name: Option<String>,
    pub generation: u64,
    pub producer: Option<ProducerKind>,
    pub note_count: Option<usize>,
    pub last_error: Option<SessionFailure>,
    pub view_mode: ViewMode,
}

struct SessionInner {
    phase: SessionPhase,
    file: Option<UploadedFile>,
    /// Bumped on every file selection and reset
    generation: u64,
    /// Generation the last dispatch served
    dispatched_generation: Option<u64>,
    note_sequence: Option<Arc<NoteSequence>>,
    last_error: Option<SessionFailure>,
    producer: Option<ProducerKind>,
    presenter: ResultsPresenter,
    cancel: Option<CancellationToken>,
}

/// One user's transcription session
pub struct SessionController {
    id: Uuid,
    loader: Arc<ModelLoader>,
    producers: Producers,
    extension_rule: ExtensionRule,
    event_bus: EventBus,
    inner: Mutex<SessionInner>,
    phase_tx: watch::Sender<SessionPhase>,
}

impl SessionController {
    pub fn new(producers: Producers, extension_rule: ExtensionRule, event_bus: EventBus) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        Arc::new(Self {
            id: Uuid::new_v4(),
            loader: Arc::clone(producers.loader()),
            producers,
            extension_rule,
            event_bus,
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Idle,
                file: None,
                generation: 0,
                dispatched_generation: None,
                note_sequence: None,
                last_error: None,
                producer: None,
                presenter: ResultsPresenter::new(),
                cancel: None,
            }),
            phase_tx,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start the session: enter AWAITING_MODEL and initialize the model
    ///
    /// The returned task settles once initialization finished and any
    /// pending file was dispatched.
    pub async fn mount(self: &Arc<Self>) -> JoinHandle<()> {
        self.event_bus.emit_lossy(ScribeEvent::SessionCreated {
            session_id: self.id,
            timestamp: Utc::now(),
        });

        {
            let mut inner = self.inner.lock().await;
            self.set_phase(&mut inner, SessionPhase::AwaitingModel);
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let readiness = this.loader.initialize().await;
            info!(session_id = %this.id, readiness = %readiness, "Model initialization settled");

            let mut inner = this.inner.lock().await;
            if inner.phase == SessionPhase::AwaitingModel {
                this.set_phase(&mut inner, SessionPhase::Idle);
            }
            this.reconcile_locked(&mut inner);
        })
    }

    /// Record a newly selected file; returns its generation
    ///
    /// Supersedes any previous file and cancels its outstanding dispatch.
    /// Production starts immediately if the model is ready, otherwise when
    /// it becomes ready.
    pub async fn select_file(self: &Arc<Self>, file: UploadedFile) -> u64 {
        let mut inner = self.inner.lock().await;

        inner.generation += 1;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        info!(
            session_id = %self.id,
            generation = inner.generation,
            file = %file.name(),
            "File selected"
        );
        inner.file = Some(file);
        inner.note_sequence = None;
        inner.last_error = None;
        inner.producer = None;

        if !self.reconcile_locked(&mut inner) {
            let waiting = if self.loader.readiness().is_settled() {
                SessionPhase::Idle
            } else {
                SessionPhase::AwaitingModel
            };
            self.set_phase(&mut inner, waiting);
        }
        inner.generation
    }

    /// Re-run the dispatch check; returns whether a producer was started
    pub async fn reconcile(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock().await;
        self.reconcile_locked(&mut inner)
    }

    /// Dispatch the current file if the model is ready and this generation
    /// has not been dispatched yet
    fn reconcile_locked(self: &Arc<Self>, inner: &mut SessionInner) -> bool {
        let Some(file) = inner.file.clone() else {
            return false;
        };
        if !self.loader.is_ready() {
            debug!(session_id = %self.id, "Model not ready, dispatch deferred");
            return false;
        }
        let generation = inner.generation;
        if inner.dispatched_generation == Some(generation) {
            debug!(session_id = %self.id, generation, "Generation already dispatched");
            return false;
        }
        inner.dispatched_generation = Some(generation);

        self.set_phase(inner, SessionPhase::Classifying);
        let kind = classify_with(file.name(), self.extension_rule);
        inner.producer = Some(kind);
        let working = match kind {
            ProducerKind::MidiDecode => SessionPhase::Decoding,
            ProducerKind::AudioTranscribe => SessionPhase::Transcribing,
        };
        self.set_phase(inner, working);

        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());

        info!(
            session_id = %self.id,
            generation,
            file = %file.name(),
            producer = %kind,
            "Dispatching producer"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_producer(generation, kind, file, token).await;
        });
        true
    }

    async fn run_producer(
        self: Arc<Self>,
        generation: u64,
        kind: ProducerKind,
        file: UploadedFile,
        token: CancellationToken,
    ) {
        let result = tokio::select! {
            _ = token.cancelled() => None,
            result = self.producers.produce(kind, &file) => Some(result),
        };

        match result {
            Some(result) => self.complete(generation, kind, result).await,
            None => {
                let current = self.inner.lock().await.generation;
                self.discard_stale(generation, current, "Producer cancelled for superseded file");
            }
        }
    }

    fn discard_stale(&self, stale_generation: u64, current_generation: u64, reason: &str) {
        info!(
            session_id = %self.id,
            stale_generation,
            current_generation,
            "{}",
            reason
        );
        self.event_bus.emit_lossy(ScribeEvent::StaleResultDiscarded {
            session_id: self.id,
            stale_generation,
            current_generation,
            timestamp: Utc::now(),
        });
    }

    /// Apply a producer result if it still belongs to the current file
    async fn complete(
        &self,
        generation: u64,
        kind: ProducerKind,
        result: Result<NoteSequence, ProduceError>,
    ) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            let current = inner.generation;
            drop(inner);
            self.discard_stale(generation, current, "Discarding result for superseded file");
            return;
        }
        inner.cancel = None;

        match result {
            Ok(seq) => {
                let note_count = seq.len();
                let total_time = seq.total_time;
                inner.note_sequence = Some(Arc::new(seq));
                inner.last_error = None;
                info!(
                    session_id = %self.id,
                    generation,
                    producer = %kind,
                    note_count,
                    "Note sequence ready"
                );
                self.event_bus.emit_lossy(ScribeEvent::NoteSequenceReady {
                    session_id: self.id,
                    generation,
                    producer: kind,
                    note_count,
                    total_time,
                    timestamp: Utc::now(),
                });
                self.set_phase(&mut inner, SessionPhase::Ready);
            }
            Err(e) => {
                let failure = SessionFailure {
                    kind: e.kind(),
                    message: e.to_string(),
                };
                error!(
                    session_id = %self.id,
                    generation,
                    producer = %kind,
                    kind = %failure.kind,
                    error = %e,
                    "Producer failed"
                );
                self.event_bus.emit_lossy(ScribeEvent::TranscriptionFailed {
                    session_id: self.id,
                    generation,
                    producer: kind,
                    kind: failure.kind,
                    message: failure.message.clone(),
                    timestamp: Utc::now(),
                });
                inner.last_error = Some(failure);
                self.set_phase(&mut inner, SessionPhase::Error);
            }
        }
    }

    /// Re-dispatch the current file after a failure
    pub async fn retry(self: &Arc<Self>) -> Result<u64, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != SessionPhase::Error {
            return Err(SessionError::NotRetryable(inner.phase));
        }
        info!(session_id = %self.id, generation = inner.generation, "Retrying");
        inner.dispatched_generation = None;
        inner.last_error = None;
        self.reconcile_locked(&mut inner);
        Ok(inner.generation)
    }

    /// Clear file, result and error ("Convert More")
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        inner.file = None;
        inner.note_sequence = None;
        inner.last_error = None;
        inner.producer = None;
        inner.dispatched_generation = None;

        let phase = if self.loader.readiness().is_settled() {
            SessionPhase::Idle
        } else {
            SessionPhase::AwaitingModel
        };
        self.set_phase(&mut inner, phase);
        debug!(session_id = %self.id, generation = inner.generation, "Session reset");
    }

    /// Cancel outstanding work and announce removal
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            if let Some(token) = inner.cancel.take() {
                token.cancel();
            }
        }
        self.event_bus.emit_lossy(ScribeEvent::SessionClosed {
            session_id: self.id,
            timestamp: Utc::now(),
        });
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            session_id: self.id,
            phase: inner.phase,
            model_readiness: self.loader.readiness(),
            file_name: inner.file.as_ref().map(|f| f.name().to_string()),
            generation: inner.generation,
            producer: inner.producer,
            note_count: inner.note_sequence.as_ref().map(|s| s.len()),
            last_error: inner.last_error.clone(),
            view_mode: inner.presenter.view_mode(),
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    pub async fn note_sequence(&self) -> Option<Arc<NoteSequence>> {
        self.inner.lock().await.note_sequence.clone()
    }

    pub async fn view_mode(&self) -> ViewMode {
        self.inner.lock().await.presenter.view_mode()
    }

    /// Flip between piano roll and staff; returns the new mode
    pub async fn toggle_view(&self) -> ViewMode {
        let mut inner = self.inner.lock().await;
        let mode = inner.presenter.toggle();
        debug!(session_id = %self.id, view_mode = %mode, "View toggled");
        mode
    }

    /// SVG of the current view; `None` without a note sequence
    ///
    /// Renders on the blocking pool, outside the session lock.
    pub async fn render_view(&self) -> Result<Option<String>, JoinError> {
        let (seq, mode) = {
            let inner = self.inner.lock().await;
            match &inner.note_sequence {
                Some(seq) => (Arc::clone(seq), inner.presenter.view_mode()),
                None => return Ok(None),
            }
        };
        tokio::task::spawn_blocking(move || render(&seq, mode))
            .await
            .map(Some)
    }

    /// Watch phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Wait until the current attempt reaches READY or ERROR
    pub async fn wait_until_settled(&self) -> SessionPhase {
        let mut rx = self.phase_tx.subscribe();
        let phase = match rx.wait_for(|p| p.is_terminal()).await {
            Ok(phase) => *phase,
            Err(_) => *self.phase_tx.borrow(),
        };
        phase
    }

    fn set_phase(&self, inner: &mut SessionInner, new_phase: SessionPhase) {
        let old_phase = inner.phase;
        if old_phase == new_phase {
            return;
        }
        inner.phase = new_phase;
        debug!(
            session_id = %self.id,
            generation = inner.generation,
            "Phase {} → {}",
            old_phase,
            new_phase
        );
        self.event_bus.emit_lossy(ScribeEvent::SessionPhaseChanged {
            session_id: self.id,
            old_phase,
            new_phase,
            generation: inner.generation,
            timestamp: Utc::now(),
        });
        self.phase_tx.send_replace(new_phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, TranscriptionEngine};
    use async_trait::async_trait;
    use sonic_common::note_sequence::Note;

    /// Ready at once; transcriptions never finish on their own
    struct ParkedEngine;

    #[async_trait]
    impl TranscriptionEngine for ParkedEngine {
        fn name(&self) -> &'static str {
            "parked"
        }

        async fn initialize(&self) -> Result<(), ModelError> {
            Ok(())
        }

        async fn transcribe(&self, _file: &UploadedFile) -> Result<NoteSequence, ModelError> {
            std::future::pending().await
        }
    }

    fn parked_session() -> (Arc<SessionController>, EventBus) {
        let bus = EventBus::new(64);
        let loader = Arc::new(ModelLoader::new(Arc::new(ParkedEngine), bus.clone()));
        let session = SessionController::new(
            Producers::new(loader, false),
            ExtensionRule::FirstToken,
            bus.clone(),
        );
        (session, bus)
    }

    #[tokio::test]
    async fn test_result_finishing_after_reselection_is_discarded() {
        let (session, bus) = parked_session();
        session.mount().await.await.unwrap();

        let first = session.select_file(UploadedFile::from_bytes("first.wav", Vec::new())).await;
        let second = session.select_file(UploadedFile::from_bytes("second.wav", Vec::new())).await;
        assert_eq!(session.phase().await, SessionPhase::Transcribing);

        // First producer resolves after the second selection already landed
        let mut rx = bus.subscribe();
        let mut late = NoteSequence::new();
        late.push_note(Note::new(60, 90, 0.0, 1.0));
        session.complete(first, ProducerKind::AudioTranscribe, Ok(late)).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Transcribing);
        assert_eq!(snapshot.generation, second);
        assert_eq!(snapshot.note_count, None);
        assert!(session.note_sequence().await.is_none());

        let discarded = loop {
            match rx.recv().await.unwrap() {
                ScribeEvent::StaleResultDiscarded {
                    stale_generation,
                    current_generation,
                    ..
                } => break (stale_generation, current_generation),
                _ => continue,
            }
        };
        assert_eq!(discarded, (first, second));
    }

    #[tokio::test]
    async fn test_late_failure_does_not_mark_newer_file_failed() {
        let (session, _bus) = parked_session();
        session.mount().await.await.unwrap();

        let first = session.select_file(UploadedFile::from_bytes("first.wav", Vec::new())).await;
        session.select_file(UploadedFile::from_bytes("second.wav", Vec::new())).await;

        session
            .complete(
                first,
                ProducerKind::AudioTranscribe,
                Err(ProduceError::Transcription("late".to_string())),
            )
            .await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Transcribing);
        assert!(snapshot.last_error.is_none());
    }
}
