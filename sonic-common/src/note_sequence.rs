//! Note sequence data model
//!
//! A `NoteSequence` is the format-neutral representation every producer
//! (MIDI decoding, audio transcription) yields and every consumer
//! (visualizers, MusicXML/MIDI exporters) reads. Times are in seconds.

use serde::{Deserialize, Serialize};

/// Default MIDI resolution used when a sequence did not come from a MIDI file
pub const DEFAULT_TICKS_PER_QUARTER: u16 = 220;

/// Tempo assumed when a sequence carries no tempo events
pub const DEFAULT_QPM: f64 = 120.0;

/// A single note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch (0-127)
    pub pitch: u8,
    /// MIDI velocity (0-127)
    pub velocity: u8,
    /// Onset in seconds
    pub start_time: f64,
    /// Release in seconds
    pub end_time: f64,
    /// General MIDI program
    #[serde(default)]
    pub program: u8,
    /// Source track or voice index
    #[serde(default)]
    pub instrument: u32,
    /// Percussion note (MIDI channel 10)
    #[serde(default)]
    pub is_drum: bool,
}

impl Note {
    /// Create a pitched note on instrument 0, program 0
    pub fn new(pitch: u8, velocity: u8, start_time: f64, end_time: f64) -> Self {
        Self {
            pitch,
            velocity,
            start_time,
            end_time,
            program: 0,
            instrument: 0,
            is_drum: false,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// Tempo change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    /// Time in seconds at which the tempo takes effect
    pub time: f64,
    /// Quarter notes per minute
    pub qpm: f64,
}

/// Time signature change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Time in seconds, stored in milliseconds to keep the type `Eq`
    pub time_ms: u64,
    pub numerator: u8,
    pub denominator: u8,
}

/// Ordered collection of notes plus the timing context needed to export them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSequence {
    /// MIDI resolution (ticks per quarter note)
    pub ticks_per_quarter: u16,
    /// End of the last note, in seconds
    pub total_time: f64,
    #[serde(default)]
    pub tempos: Vec<Tempo>,
    #[serde(default)]
    pub time_signatures: Vec<TimeSignature>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Default for NoteSequence {
    fn default() -> Self {
        Self {
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            total_time: 0.0,
            tempos: Vec::new(),
            time_signatures: Vec::new(),
            notes: Vec::new(),
        }
    }
}

impl NoteSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a note, extending `total_time` to cover it
    pub fn push_note(&mut self, note: Note) {
        if note.end_time > self.total_time {
            self.total_time = note.end_time;
        }
        self.notes.push(note);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Initial tempo in quarter notes per minute
    pub fn qpm(&self) -> f64 {
        self.tempos
            .iter()
            .min_by(|a, b| a.time.total_cmp(&b.time))
            .map(|t| t.qpm)
            .filter(|qpm| *qpm > 0.0)
            .unwrap_or(DEFAULT_QPM)
    }

    /// Duration of one quarter note at the initial tempo
    pub fn seconds_per_quarter(&self) -> f64 {
        60.0 / self.qpm()
    }

    /// Initial time signature as (numerator, denominator), 4/4 if none
    pub fn time_signature(&self) -> (u8, u8) {
        self.time_signatures
            .iter()
            .min_by_key(|ts| ts.time_ms)
            .filter(|ts| ts.numerator > 0 && ts.denominator > 0)
            .map(|ts| (ts.numerator, ts.denominator))
            .unwrap_or((4, 4))
    }

    /// Notes that carry a pitch (drums excluded)
    pub fn pitched_notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| !n.is_drum)
    }

    /// Lowest and highest pitch over all notes
    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        let min = self.notes.iter().map(|n| n.pitch).min()?;
        let max = self.notes.iter().map(|n| n.pitch).max()?;
        Some((min, max))
    }

    /// Sort notes by onset, then pitch
    pub fn sort(&mut self) {
        self.notes.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.pitch.cmp(&b.pitch))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_note_extends_total_time() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(60, 80, 0.0, 1.5));
        seq.push_note(Note::new(64, 80, 0.5, 1.0));

        assert_eq!(seq.len(), 2);
        assert_eq!(seq.total_time, 1.5);
    }

    #[test]
    fn test_defaults_without_tempo_or_meter() {
        let seq = NoteSequence::new();
        assert_eq!(seq.qpm(), DEFAULT_QPM);
        assert_eq!(seq.time_signature(), (4, 4));
        assert_eq!(seq.seconds_per_quarter(), 0.5);
        assert!(seq.pitch_range().is_none());
    }

    #[test]
    fn test_initial_tempo_is_earliest() {
        let mut seq = NoteSequence::new();
        seq.tempos.push(Tempo { time: 4.0, qpm: 90.0 });
        seq.tempos.push(Tempo { time: 0.0, qpm: 60.0 });
        assert_eq!(seq.qpm(), 60.0);
    }

    #[test]
    fn test_sort_and_pitch_range() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(72, 80, 1.0, 2.0));
        seq.push_note(Note::new(48, 80, 0.0, 1.0));
        seq.push_note(Note::new(60, 80, 0.0, 1.0));
        seq.sort();

        let pitches: Vec<u8> = seq.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![48, 60, 72]);
        assert_eq!(seq.pitch_range(), Some((48, 72)));
    }

    #[test]
    fn test_pitched_notes_skip_drums() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(60, 80, 0.0, 1.0));
        let mut kick = Note::new(36, 100, 0.0, 0.1);
        kick.is_drum = true;
        seq.push_note(kick);

        assert_eq!(seq.pitched_notes().count(), 1);
    }
}
