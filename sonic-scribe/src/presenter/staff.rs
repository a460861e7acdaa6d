//! Staff view: five-line staff with noteheads placed by diatonic step
//!
//! Single staff, clef from the median pitch, sharps for black keys and
//! ledger lines outside the staff. Drum notes are not drawn.

use super::svg::SvgBuilder;
use crate::codec::musicxml::{spell_pitch, Clef};
use sonic_common::NoteSequence;

const LINE_SPACING: f64 = 10.0;
const PIXELS_PER_SECOND: f64 = 80.0;
const LEFT_MARGIN: f64 = 60.0;
const RIGHT_MARGIN: f64 = 20.0;
/// Staff top line y
const STAFF_TOP: f64 = 70.0;
const HEIGHT: f64 = 220.0;
const LEDGER_HALF_WIDTH: f64 = 9.0;

const STAFF_COLOR: &str = "#444444";
const NOTE_COLOR: &str = "#111111";

/// Diatonic index of C, D, E, F, G, A, B
fn letter_index(step: &str) -> i32 {
    match step {
        "C" => 0,
        "D" => 1,
        "E" => 2,
        "F" => 3,
        "G" => 4,
        "A" => 5,
        _ => 6,
    }
}

/// Diatonic step counted from C-1
fn diatonic_step(pitch: u8) -> (i32, bool) {
    let (step, alter, octave) = spell_pitch(pitch);
    ((octave + 1) * 7 + letter_index(step), alter != 0)
}

/// Diatonic step of the bottom staff line (E4 treble, G2 bass)
fn bottom_line_step(clef: Clef) -> i32 {
    match clef {
        Clef::Treble => diatonic_step(64).0,
        Clef::Bass => diatonic_step(43).0,
    }
}

pub fn render_staff(seq: &NoteSequence) -> String {
    let clef = Clef::for_sequence(seq);
    let bottom = bottom_line_step(clef);
    let top = bottom + 8;
    let staff_bottom_y = STAFF_TOP + 4.0 * LINE_SPACING;
    let y_for = |step: i32| staff_bottom_y - (step - bottom) as f64 * LINE_SPACING / 2.0;

    let width = LEFT_MARGIN + seq.total_time.max(1.0) * PIXELS_PER_SECOND + RIGHT_MARGIN;
    let mut svg = SvgBuilder::new(width, HEIGHT, "staff-view");

    for i in 0..5 {
        let y = STAFF_TOP + i as f64 * LINE_SPACING;
        svg.line(10.0, y, width - 10.0, y, STAFF_COLOR, 1.0);
    }
    let clef_glyph = match clef {
        Clef::Treble => "\u{1D11E}",
        Clef::Bass => "\u{1D122}",
    };
    svg.text(14.0, staff_bottom_y, clef_glyph, 40.0, NOTE_COLOR);

    for note in seq.pitched_notes() {
        let (step, sharp) = diatonic_step(note.pitch);
        let x = LEFT_MARGIN + note.start_time * PIXELS_PER_SECOND;
        let y = y_for(step);

        // Ledger lines sit on even offsets from the outer staff lines
        let mut ledger = bottom - 2;
        while ledger >= step {
            svg.line(x - LEDGER_HALF_WIDTH, y_for(ledger), x + LEDGER_HALF_WIDTH, y_for(ledger), STAFF_COLOR, 1.0);
            ledger -= 2;
        }
        let mut ledger = top + 2;
        while ledger <= step {
            svg.line(x - LEDGER_HALF_WIDTH, y_for(ledger), x + LEDGER_HALF_WIDTH, y_for(ledger), STAFF_COLOR, 1.0);
            ledger += 2;
        }

        if sharp {
            svg.text(x - 18.0, y + 4.0, "\u{266F}", 14.0, NOTE_COLOR);
        }
        svg.notehead(x, y, 6.0, 4.5, NOTE_COLOR, note.pitch);
    }

    svg.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_common::Note;

    #[test]
    fn test_diatonic_steps() {
        // C4 and C#4 share a staff position
        assert_eq!(diatonic_step(60), (35, false));
        assert_eq!(diatonic_step(61), (35, true));
        assert_eq!(diatonic_step(62).0, 36);
        assert_eq!(bottom_line_step(Clef::Treble), 37);
    }

    #[test]
    fn test_middle_c_gets_one_ledger_line_in_treble() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(60, 80, 0.0, 1.0));
        seq.push_note(Note::new(72, 80, 1.0, 2.0));
        seq.push_note(Note::new(76, 80, 2.0, 3.0));

        let svg = render_staff(&seq);
        assert!(svg.contains("\u{1D11E}"));
        // Five staff lines plus one ledger line for C4
        assert_eq!(svg.matches("<line").count(), 6);
        assert_eq!(svg.matches("notehead").count(), 3);
    }

    #[test]
    fn test_sharps_and_drums() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(66, 80, 0.0, 1.0));
        let mut drum = Note::new(38, 80, 0.0, 0.2);
        drum.is_drum = true;
        seq.push_note(drum);

        let svg = render_staff(&seq);
        assert_eq!(svg.matches("\u{266F}").count(), 1);
        assert_eq!(svg.matches("notehead").count(), 1);
    }
}
