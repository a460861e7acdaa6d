//! Note sequence codecs
//!
//! - `midi`: Standard MIDI File ⇄ NoteSequence (via midly)
//! - `musicxml`: NoteSequence → MusicXML score-partwise document

pub mod midi;
pub mod musicxml;

pub use midi::{midi_to_note_sequence, note_sequence_to_midi};
pub use musicxml::note_sequence_to_musicxml;

use thiserror::Error;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input bytes are not a usable Standard MIDI File
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    /// Serializing the MIDI file failed
    #[error("MIDI write error: {0}")]
    MidiWrite(#[from] std::io::Error),

    /// Structurally valid input the codec does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
