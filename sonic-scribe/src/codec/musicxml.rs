//! NoteSequence → MusicXML (score-partwise 3.1)
//!
//! The encoder produces a single-part, single-voice score:
//! - onsets and releases are quantized to a sixteenth-note grid using the
//!   initial tempo, clamped to [`MIN_QPM`, `MAX_QPM`]
//! - notes sharing an onset become a chord lasting until the next onset
//! - gaps become rests, and the last measure is padded with rests
//! - anything crossing a barline is split and tied
//! - pitches are spelled with sharps; drum notes are left out

use sonic_common::note_sequence::NoteSequence;
use std::collections::BTreeMap;

/// Divisions per quarter note (sixteenth-note grid)
pub const DIVISIONS: u32 = 4;

/// Tempo range the score is notated in
pub const MIN_QPM: f64 = 20.0;
pub const MAX_QPM: f64 = 400.0;

/// Representable durations in divisions, longest first, with (type, dotted)
const NOTE_VALUES: [(u32, &str, bool); 9] = [
    (24, "whole", true),
    (16, "whole", false),
    (12, "half", true),
    (8, "half", false),
    (6, "quarter", true),
    (4, "quarter", false),
    (3, "eighth", true),
    (2, "eighth", false),
    (1, "16th", false),
];

const STEPS: [(&str, i8); 12] = [
    ("C", 0),
    ("C", 1),
    ("D", 0),
    ("D", 1),
    ("E", 0),
    ("F", 0),
    ("F", 1),
    ("G", 0),
    ("G", 1),
    ("A", 0),
    ("A", 1),
    ("B", 0),
];

/// Staff clef
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clef {
    Treble,
    Bass,
}

impl Clef {
    /// Bass clef when the median pitched note is below middle C
    pub fn for_sequence(seq: &NoteSequence) -> Self {
        let mut pitches: Vec<u8> = seq.pitched_notes().map(|n| n.pitch).collect();
        if pitches.is_empty() {
            return Clef::Treble;
        }
        pitches.sort_unstable();
        if pitches[pitches.len() / 2] < 60 {
            Clef::Bass
        } else {
            Clef::Treble
        }
    }

    fn sign_and_line(&self) -> (&'static str, u8) {
        match self {
            Clef::Treble => ("G", 2),
            Clef::Bass => ("F", 4),
        }
    }
}

/// Step letter, chromatic alteration and octave of a MIDI pitch
pub fn spell_pitch(pitch: u8) -> (&'static str, i8, i32) {
    let (step, alter) = STEPS[(pitch % 12) as usize];
    (step, alter, pitch as i32 / 12 - 1)
}

/// A chord or rest spanning [start, start + duration) in divisions
struct Segment {
    start: u32,
    duration: u32,
    /// Empty for rests
    pitches: Vec<u8>,
}

/// One printed note/rest/chord inside a measure
struct Element {
    pitches: Vec<u8>,
    duration: u32,
    tie_stop: bool,
    tie_start: bool,
}

fn notated_qpm(seq: &NoteSequence) -> f64 {
    seq.qpm().clamp(MIN_QPM, MAX_QPM)
}

fn quantize(seconds: f64, seconds_per_quarter: f64) -> u32 {
    (seconds.max(0.0) / seconds_per_quarter * DIVISIONS as f64).round() as u32
}

/// Turn notes into gapless chord/rest segments
fn build_segments(seq: &NoteSequence) -> Vec<Segment> {
    let spq = 60.0 / notated_qpm(seq);
    let mut onsets: BTreeMap<u32, (u32, Vec<u8>)> = BTreeMap::new();
    for note in seq.pitched_notes() {
        let start = quantize(note.start_time, spq);
        let end = quantize(note.end_time, spq).max(start.saturating_add(1));
        let entry = onsets.entry(start).or_insert((end, Vec::new()));
        entry.0 = entry.0.max(end);
        entry.1.push(note.pitch);
    }

    let starts: Vec<u32> = onsets.keys().copied().collect();
    let mut segments = Vec::new();
    let mut cursor = 0u32;
    for (idx, (start, (end, mut pitches))) in onsets.into_iter().enumerate() {
        let end = match starts.get(idx + 1) {
            Some(next) => end.min(*next),
            None => end,
        };
        if start > cursor {
            segments.push(Segment {
                start: cursor,
                duration: start - cursor,
                pitches: Vec::new(),
            });
        }
        pitches.sort_unstable();
        pitches.dedup();
        segments.push(Segment {
            start,
            duration: end - start,
            pitches,
        });
        cursor = end;
    }
    segments
}

fn decompose(mut duration: u32) -> Vec<u32> {
    let mut parts = Vec::new();
    while duration > 0 {
        let value = NOTE_VALUES
            .iter()
            .map(|(d, _, _)| *d)
            .find(|d| *d <= duration)
            .unwrap_or(1);
        parts.push(value);
        duration -= value;
    }
    parts
}

/// Distribute segments over measures, splitting at barlines
fn layout(segments: Vec<Segment>, measure_len: u32) -> Vec<Vec<Element>> {
    let content_end = segments
        .last()
        .map(|s| s.start.saturating_add(s.duration))
        .unwrap_or(0);
    let measure_count = content_end.div_ceil(measure_len).max(1);
    let total = measure_count.saturating_mul(measure_len);

    let mut all = segments;
    if content_end < total {
        all.push(Segment {
            start: content_end,
            duration: total - content_end,
            pitches: Vec::new(),
        });
    }

    let mut measures: Vec<Vec<Element>> = (0..measure_count).map(|_| Vec::new()).collect();
    for segment in all {
        let end = segment.start.saturating_add(segment.duration);
        let mut pieces: Vec<(usize, u32)> = Vec::new();
        let mut pos = segment.start;
        while pos < end {
            let measure = pos / measure_len;
            let piece_end = end.min((measure + 1).saturating_mul(measure_len));
            for part in decompose(piece_end - pos) {
                pieces.push((measure as usize, part));
            }
            pos = piece_end;
        }

        let is_rest = segment.pitches.is_empty();
        let count = pieces.len();
        for (i, (measure, duration)) in pieces.into_iter().enumerate() {
            measures[measure].push(Element {
                pitches: segment.pitches.clone(),
                duration,
                tie_stop: !is_rest && i > 0,
                tie_start: !is_rest && i + 1 < count,
            });
        }
    }
    measures
}

fn note_type(duration: u32) -> (&'static str, bool) {
    NOTE_VALUES
        .iter()
        .find(|(d, _, _)| *d == duration)
        .map(|(_, name, dotted)| (*name, *dotted))
        .unwrap_or(("16th", false))
}

fn write_element(xml: &mut String, element: &Element) {
    let (type_name, dotted) = note_type(element.duration);
    let voices: Vec<Option<u8>> = if element.pitches.is_empty() {
        vec![None]
    } else {
        element.pitches.iter().copied().map(Some).collect()
    };

    for (idx, pitch) in voices.into_iter().enumerate() {
        xml.push_str("      <note>\n");
        if idx > 0 {
            xml.push_str("        <chord/>\n");
        }
        match pitch {
            Some(pitch) => {
                let (step, alter, octave) = spell_pitch(pitch);
                xml.push_str("        <pitch>\n");
                xml.push_str(&format!("          <step>{}</step>\n", step));
                if alter != 0 {
                    xml.push_str(&format!("          <alter>{}</alter>\n", alter));
                }
                xml.push_str(&format!("          <octave>{}</octave>\n", octave));
                xml.push_str("        </pitch>\n");
            }
            None => xml.push_str("        <rest/>\n"),
        }
        xml.push_str(&format!("        <duration>{}</duration>\n", element.duration));
        if element.tie_stop {
            xml.push_str("        <tie type=\"stop\"/>\n");
        }
        if element.tie_start {
            xml.push_str("        <tie type=\"start\"/>\n");
        }
        xml.push_str("        <voice>1</voice>\n");
        xml.push_str(&format!("        <type>{}</type>\n", type_name));
        if dotted {
            xml.push_str("        <dot/>\n");
        }
        if matches!(pitch, Some(p) if spell_pitch(p).1 != 0) {
            xml.push_str("        <accidental>sharp</accidental>\n");
        }
        if element.tie_stop || element.tie_start {
            xml.push_str("        <notations>\n");
            if element.tie_stop {
                xml.push_str("          <tied type=\"stop\"/>\n");
            }
            if element.tie_start {
                xml.push_str("          <tied type=\"start\"/>\n");
            }
            xml.push_str("        </notations>\n");
        }
        xml.push_str("      </note>\n");
    }
}

/// Serialize a NoteSequence as a MusicXML document
pub fn note_sequence_to_musicxml(seq: &NoteSequence) -> String {
    let (beats, beat_type) = seq.time_signature();
    let measure_len = (beats as u32 * DIVISIONS * 4 / beat_type.max(1) as u32).max(1);
    let clef = Clef::for_sequence(seq);
    let (clef_sign, clef_line) = clef.sign_and_line();
    let measures = layout(build_segments(seq), measure_len);

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
    xml.push_str("<!DOCTYPE score-partwise PUBLIC \"-//Recordare//DTD MusicXML 3.1 Partwise//EN\" \"http://www.musicxml.org/dtds/partwise.dtd\">\n");
    xml.push_str("<score-partwise version=\"3.1\">\n");
    xml.push_str("  <work>\n    <work-title>Transcription</work-title>\n  </work>\n");
    xml.push_str("  <identification>\n    <encoding>\n");
    xml.push_str(&format!(
        "      <software>sonic-scribe {}</software>\n",
        env!("CARGO_PKG_VERSION")
    ));
    xml.push_str("    </encoding>\n  </identification>\n");
    xml.push_str("  <part-list>\n    <score-part id=\"P1\">\n      <part-name>Transcription</part-name>\n    </score-part>\n  </part-list>\n");
    xml.push_str("  <part id=\"P1\">\n");

    for (idx, elements) in measures.iter().enumerate() {
        xml.push_str(&format!("    <measure number=\"{}\">\n", idx + 1));
        if idx == 0 {
            xml.push_str("      <attributes>\n");
            xml.push_str(&format!("        <divisions>{}</divisions>\n", DIVISIONS));
            xml.push_str("        <key>\n          <fifths>0</fifths>\n        </key>\n");
            xml.push_str(&format!(
                "        <time>\n          <beats>{}</beats>\n          <beat-type>{}</beat-type>\n        </time>\n",
                beats, beat_type
            ));
            xml.push_str(&format!(
                "        <clef>\n          <sign>{}</sign>\n          <line>{}</line>\n        </clef>\n",
                clef_sign, clef_line
            ));
            xml.push_str("      </attributes>\n");
            xml.push_str(&format!(
                "      <direction placement=\"above\">\n        <direction-type>\n          <metronome>\n            <beat-unit>quarter</beat-unit>\n            <per-minute>{}</per-minute>\n          </metronome>\n        </direction-type>\n        <sound tempo=\"{}\"/>\n      </direction>\n",
                notated_qpm(seq).round(),
                notated_qpm(seq).round()
            ));
        }
        for element in elements {
            write_element(&mut xml, element);
        }
        xml.push_str("    </measure>\n");
    }

    xml.push_str("  </part>\n");
    xml.push_str("</score-partwise>\n");
    xml
}
