//! Controllable TranscriptionEngine for deterministic session tests
//!
//! Initialization and transcription each wait on a semaphore gate, so a
//! test decides exactly when the model becomes ready and when outstanding
//! transcriptions resolve.

use async_trait::async_trait;
use sonic_common::note_sequence::{Note, NoteSequence};
use sonic_scribe::intake::UploadedFile;
use sonic_scribe::model::{ModelError, TranscriptionEngine};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const OPEN: usize = 1 << 20;

/// Pitch the stub reports for a file name
pub fn stub_pitch(file_name: &str) -> u8 {
    (file_name.bytes().map(u32::from).sum::<u32>() % 128) as u8
}

pub struct StubEngine {
    init_gate: Semaphore,
    transcribe_gate: Semaphore,
    init_fails: bool,
    transcribe_fails: AtomicBool,
    concurrent: bool,
    pub init_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl StubEngine {
    pub fn new(init_open: bool, transcribe_open: bool) -> Arc<Self> {
        Self::build(init_open, transcribe_open, false, true)
    }

    /// Initializes and transcribes without waiting
    pub fn ready() -> Arc<Self> {
        Self::new(true, true)
    }

    /// Initialization fails as soon as it runs
    pub fn failing_init() -> Arc<Self> {
        Self::build(true, true, true, true)
    }

    /// Declares that overlapping transcribe calls are unsupported
    pub fn single_call() -> Arc<Self> {
        Self::build(true, true, false, false)
    }

    fn build(init_open: bool, transcribe_open: bool, init_fails: bool, concurrent: bool) -> Arc<Self> {
        let permits = |open: bool| if open { OPEN } else { 0 };
        Arc::new(Self {
            init_gate: Semaphore::new(permits(init_open)),
            transcribe_gate: Semaphore::new(permits(transcribe_open)),
            init_fails,
            transcribe_fails: AtomicBool::new(false),
            concurrent,
            init_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn open_init(&self) {
        self.init_gate.add_permits(OPEN);
    }

    pub fn release_transcriptions(&self, count: usize) {
        self.transcribe_gate.add_permits(count);
    }

    pub fn set_transcribe_fails(&self, fails: bool) {
        self.transcribe_fails.store(fails, Ordering::SeqCst);
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn initialize(&self) -> Result<(), ModelError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.init_gate
            .acquire()
            .await
            .map_err(|e| ModelError::Init(e.to_string()))?
            .forget();
        if self.init_fails {
            return Err(ModelError::Init("stub weights unavailable".to_string()));
        }
        Ok(())
    }

    async fn transcribe(&self, file: &UploadedFile) -> Result<NoteSequence, ModelError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let gate = self.transcribe_gate.acquire().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        gate.map_err(|e| ModelError::Transcription(e.to_string()))?.forget();

        if self.transcribe_fails.load(Ordering::SeqCst) {
            return Err(ModelError::Transcription("stub engine failure".to_string()));
        }

        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(stub_pitch(file.name()), 100, 0.0, 0.5));
        Ok(seq)
    }

    fn supports_concurrent_calls(&self) -> bool {
        self.concurrent
    }
}
