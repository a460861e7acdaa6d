//! Results presentation: view toggle, renderers and exports
//!
//! Rendering is a pure function of `(NoteSequence, ViewMode)`. Exports
//! produce a [`Download`] and are no-ops when there is no sequence.

mod piano_roll;
mod staff;
mod svg;

pub use piano_roll::render_piano_roll;
pub use staff::render_staff;

use crate::codec::{note_sequence_to_midi, note_sequence_to_musicxml, CodecError};
use serde::{Deserialize, Serialize};
use sonic_common::NoteSequence;
use std::path::Path;

/// MIME type of both downloads
pub const DOWNLOAD_MIME_TYPE: &str = "application/octet-stream";
pub const MUSICXML_FILE_NAME: &str = "music.xml";
pub const MIDI_FILE_NAME: &str = "music.midi";

/// Which visualization is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    #[default]
    PianoRoll,
    Staff,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::PianoRoll => ViewMode::Staff,
            ViewMode::Staff => ViewMode::PianoRoll,
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewMode::PianoRoll => write!(f, "pianoRoll"),
            ViewMode::Staff => write!(f, "staff"),
        }
    }
}

/// Exported file ready to be saved
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: &'static str,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    /// Write the bytes to `path`
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, &self.bytes).await
    }
}

/// Per-session presenter state
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultsPresenter {
    view_mode: ViewMode,
}

impl ResultsPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    /// Flip the view; returns the new mode
    pub fn toggle(&mut self) -> ViewMode {
        self.view_mode = self.view_mode.toggled();
        self.view_mode
    }
}

/// SVG for `seq` in `mode`
pub fn render(seq: &NoteSequence, mode: ViewMode) -> String {
    match mode {
        ViewMode::PianoRoll => render_piano_roll(seq),
        ViewMode::Staff => render_staff(seq),
    }
}

pub fn export_musicxml(seq: Option<&NoteSequence>) -> Option<Download> {
    let seq = seq?;
    Some(Download {
        file_name: MUSICXML_FILE_NAME,
        mime_type: DOWNLOAD_MIME_TYPE,
        bytes: note_sequence_to_musicxml(seq).into_bytes(),
    })
}

pub fn export_midi(seq: Option<&NoteSequence>) -> Result<Option<Download>, CodecError> {
    let Some(seq) = seq else {
        return Ok(None);
    };
    Ok(Some(Download {
        file_name: MIDI_FILE_NAME,
        mime_type: DOWNLOAD_MIME_TYPE,
        bytes: note_sequence_to_midi(seq)?,
    }))
}
