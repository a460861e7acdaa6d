//! Transcription session type definitions
//!
//! Supporting types for model readiness and the session state machine.

use serde::{Deserialize, Serialize};

/// Transcription model readiness
///
/// Process-wide. Leaves `Uninitialized` exactly once and never goes back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelReadiness {
    /// Initialization not started or still running
    #[default]
    Uninitialized,
    /// Model loaded, transcription calls accepted
    Ready,
    /// Initialization failed; no retry is attempted
    Failed,
}

impl ModelReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelReadiness::Ready)
    }

    /// Initialization finished, successfully or not
    pub fn is_settled(&self) -> bool {
        !matches!(self, ModelReadiness::Uninitialized)
    }
}

impl std::fmt::Display for ModelReadiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelReadiness::Uninitialized => write!(f, "Uninitialized"),
            ModelReadiness::Ready => write!(f, "Ready"),
            ModelReadiness::Failed => write!(f, "Failed"),
        }
    }
}

/// Session workflow phase
///
/// IDLE → AWAITING_MODEL → CLASSIFYING → {TRANSCRIBING | DECODING} → READY,
/// with ERROR reachable from the three working phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    /// Nothing in flight
    #[default]
    Idle,
    /// Model initialization outstanding
    AwaitingModel,
    /// Choosing a producer for the selected file
    Classifying,
    /// Audio transcription outstanding
    Transcribing,
    /// MIDI decoding outstanding
    Decoding,
    /// Note sequence available
    Ready,
    /// Last attempt failed
    Error,
}

impl SessionPhase {
    /// A producer has been chosen or is running
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            SessionPhase::Classifying | SessionPhase::Transcribing | SessionPhase::Decoding
        )
    }

    /// Attempt finished (successfully or not)
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Ready | SessionPhase::Error)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::AwaitingModel => write!(f, "AwaitingModel"),
            SessionPhase::Classifying => write!(f, "Classifying"),
            SessionPhase::Transcribing => write!(f, "Transcribing"),
            SessionPhase::Decoding => write!(f, "Decoding"),
            SessionPhase::Ready => write!(f, "Ready"),
            SessionPhase::Error => write!(f, "Error"),
        }
    }
}

/// Which note-sequence producer handles a file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum ProducerKind {
    /// Parse the file as Standard MIDI
    MidiDecode,
    /// Run the file through the transcription model
    AudioTranscribe,
}

impl std::fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerKind::MidiDecode => write!(f, "MidiDecode"),
            ProducerKind::AudioTranscribe => write!(f, "AudioTranscribe"),
        }
    }
}

/// Failure category of a transcription attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum FailureKind {
    /// Model failed to load
    ModelInit,
    /// File could not be read
    Io,
    /// MIDI bytes malformed
    Decode,
    /// Audio engine failure
    Transcription,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::ModelInit => write!(f, "ModelInitError"),
            FailureKind::Io => write!(f, "IOError"),
            FailureKind::Decode => write!(f, "DecodeError"),
            FailureKind::Transcription => write!(f, "TranscriptionError"),
        }
    }
}
