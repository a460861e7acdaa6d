//! Note-sequence producers
//!
//! Two variants behind one entry point:
//! - `MidiDecode`: read the file, parse it as Standard MIDI
//! - `AudioTranscribe`: hand the file to the transcription engine
//!
//! Failures are converted to [`ProduceError`] at this boundary so the
//! session only ever sees one error type. A sequence longer than the
//! configured limit is rejected here too; renderers and exporters size
//! their output by `total_time`.

use crate::codec::{midi_to_note_sequence, CodecError};
use crate::intake::UploadedFile;
use crate::model::{ModelError, ModelLoader};
use sonic_common::events::{FailureKind, ProducerKind};
use sonic_common::NoteSequence;
use sonic_common::config::IntakeConfig;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Producer failure for one attempt
#[derive(Debug, Error)]
pub enum ProduceError {
    /// File content could not be read
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// MIDI bytes are malformed
    #[error("Failed to decode MIDI: {0}")]
    Decode(#[from] CodecError),

    /// Transcription engine failed
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Transcription requested before the model became ready
    #[error("Transcription model is not ready")]
    ModelNotReady,
}

impl ProduceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProduceError::Io(_) => FailureKind::Io,
            ProduceError::Decode(_) => FailureKind::Decode,
            ProduceError::Transcription(_) => FailureKind::Transcription,
            ProduceError::ModelNotReady => FailureKind::ModelInit,
        }
    }
}

impl From<ModelError> for ProduceError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Io(e) => ProduceError::Io(e),
            other => ProduceError::Transcription(other.to_string()),
        }
    }
}

/// Shared producer set
///
/// Cheap to clone; every session holds one.
#[derive(Clone)]
pub struct Producers {
    loader: Arc<ModelLoader>,
    /// Single permit when transcription calls must not overlap
    transcription_gate: Option<Arc<Semaphore>>,
    max_duration_seconds: f64,
}

impl Producers {
    /// `serialize_calls` forces one transcription at a time even when the
    /// engine allows overlap
    pub fn new(loader: Arc<ModelLoader>, serialize_calls: bool) -> Self {
        let serialize = serialize_calls || !loader.engine().supports_concurrent_calls();
        Self {
            loader,
            transcription_gate: serialize.then(|| Arc::new(Semaphore::new(1))),
            max_duration_seconds: IntakeConfig::default().max_duration_seconds,
        }
    }

    /// Reject sequences longer than `seconds`
    pub fn with_max_duration(mut self, seconds: f64) -> Self {
        self.max_duration_seconds = seconds;
        self
    }

    pub fn max_duration_seconds(&self) -> f64 {
        self.max_duration_seconds
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    /// Run the producer `kind` on `file`
    pub async fn produce(
        &self,
        kind: ProducerKind,
        file: &UploadedFile,
    ) -> Result<NoteSequence, ProduceError> {
        let seq = match kind {
            ProducerKind::MidiDecode => self.decode_midi(file).await?,
            ProducerKind::AudioTranscribe => self.transcribe_audio(file).await?,
        };
        self.check_duration(kind, file, seq)
    }

    fn check_duration(
        &self,
        kind: ProducerKind,
        file: &UploadedFile,
        seq: NoteSequence,
    ) -> Result<NoteSequence, ProduceError> {
        if seq.total_time <= self.max_duration_seconds {
            return Ok(seq);
        }
        warn!(
            file = %file.name(),
            total_time = seq.total_time,
            limit = self.max_duration_seconds,
            "Note sequence exceeds duration limit"
        );
        let message = format!(
            "note sequence spans {:.0} s, limit is {:.0} s",
            seq.total_time, self.max_duration_seconds
        );
        Err(match kind {
            ProducerKind::MidiDecode => ProduceError::Decode(CodecError::Unsupported(message)),
            ProducerKind::AudioTranscribe => ProduceError::Transcription(message),
        })
    }

    /// Read then decode MIDI bytes
    pub async fn decode_midi(&self, file: &UploadedFile) -> Result<NoteSequence, ProduceError> {
        let bytes = file.read_all().await?;
        debug!(file = %file.name(), bytes = bytes.len(), "Decoding MIDI");

        let seq = tokio::task::spawn_blocking(move || midi_to_note_sequence(&bytes))
            .await
            .map_err(|e| {
                ProduceError::Decode(CodecError::MidiParse(format!("Decode task failed: {}", e)))
            })??;
        Ok(seq)
    }

    /// Transcribe audio with the shared engine
    pub async fn transcribe_audio(
        &self,
        file: &UploadedFile,
    ) -> Result<NoteSequence, ProduceError> {
        if !self.loader.is_ready() {
            warn!(file = %file.name(), "Transcription requested before model ready");
            return Err(ProduceError::ModelNotReady);
        }

        let _permit = match &self.transcription_gate {
            Some(gate) => Some(
                gate.clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| ProduceError::Transcription(e.to_string()))?,
            ),
            None => None,
        };

        let seq = self.loader.engine().transcribe(file).await?;
        debug!(file = %file.name(), notes = seq.len(), "Transcription complete");
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let io = ProduceError::from(ModelError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        )));
        assert_eq!(io.kind(), FailureKind::Io);

        let engine = ProduceError::from(ModelError::Transcription("boom".to_string()));
        assert_eq!(engine.kind(), FailureKind::Transcription);

        let decode = ProduceError::from(CodecError::MidiParse("bad header".to_string()));
        assert_eq!(decode.kind(), FailureKind::Decode);
        assert_eq!(decode.kind().to_string(), "DecodeError");
    }
}
