//! Transcription engine abstraction
//!
//! The engine is process-wide and shared by every session through
//! [`ModelLoader`]. [`PitchTrackerEngine`] is the built-in implementation.

mod loader;
mod pitch_tracker;

pub use loader::ModelLoader;
pub use pitch_tracker::{transcribe_pcm, PitchTrackerEngine};

use crate::audio::AudioError;
use crate::intake::UploadedFile;
use async_trait::async_trait;
use sonic_common::NoteSequence;
use thiserror::Error;

/// Transcription engine errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Engine could not be brought up
    #[error("Model initialization failed: {0}")]
    Init(String),

    /// Engine ran but produced no result
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error(transparent)]
    AudioDecode(#[from] AudioError),

    /// Input file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio → NoteSequence engine
///
/// `initialize` is called at most once per process by [`ModelLoader`];
/// `transcribe` is only called after it succeeded.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Engine name for logs and events
    fn name(&self) -> &'static str;

    /// Load weights / prepare state
    async fn initialize(&self) -> Result<(), ModelError>;

    /// Transcribe one uploaded audio file
    async fn transcribe(&self, file: &UploadedFile) -> Result<NoteSequence, ModelError>;

    /// Whether overlapping `transcribe` calls are allowed
    fn supports_concurrent_calls(&self) -> bool {
        true
    }
}
