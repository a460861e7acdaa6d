//! Piano-roll view: time on x, pitch on y, one rectangle per note

use super::svg::SvgBuilder;
use sonic_common::NoteSequence;

const PIXELS_PER_SECOND: f64 = 100.0;
const ROW_HEIGHT: f64 = 8.0;
const KEY_LABEL_WIDTH: f64 = 36.0;
const MARGIN: f64 = 10.0;
/// Rows added above and below the used pitch range
const ROW_PADDING: u8 = 2;

const BLACK_KEY_ROW: &str = "#e8e8ee";
const NOTE_COLOR: &str = "#3a6fd8";
const DRUM_COLOR: &str = "#d8813a";
const LABEL_COLOR: &str = "#555555";

fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

pub fn render_piano_roll(seq: &NoteSequence) -> String {
    let (lowest, highest) = seq.pitch_range().unwrap_or((60, 72));
    let lowest = lowest.saturating_sub(ROW_PADDING);
    let highest = highest.saturating_add(ROW_PADDING).min(127);
    let rows = (highest - lowest) as f64 + 1.0;

    let grid_width = (seq.total_time.max(1.0)) * PIXELS_PER_SECOND;
    let width = KEY_LABEL_WIDTH + grid_width + 2.0 * MARGIN;
    let height = rows * ROW_HEIGHT + 2.0 * MARGIN;
    let grid_x = MARGIN + KEY_LABEL_WIDTH;
    let row_y = |pitch: u8| MARGIN + (highest - pitch) as f64 * ROW_HEIGHT;

    let mut svg = SvgBuilder::new(width, height, "piano-roll");

    for pitch in lowest..=highest {
        if is_black_key(pitch) {
            svg.rect(grid_x, row_y(pitch), grid_width, ROW_HEIGHT, BLACK_KEY_ROW, 1.0);
        }
        if pitch % 12 == 0 {
            let label = format!("C{}", pitch as i32 / 12 - 1);
            svg.text(MARGIN, row_y(pitch) + ROW_HEIGHT, &label, 8.0, LABEL_COLOR);
        }
    }

    // One-second grid
    let seconds = grid_width / PIXELS_PER_SECOND;
    for s in 0..=(seconds.ceil() as usize) {
        let x = grid_x + s as f64 * PIXELS_PER_SECOND;
        svg.line(x, MARGIN, x, height - MARGIN, "#cccccc", 0.5);
    }

    for note in &seq.notes {
        let x = grid_x + note.start_time * PIXELS_PER_SECOND;
        let w = (note.duration() * PIXELS_PER_SECOND).max(1.0);
        let opacity = (note.velocity as f64 / 127.0).max(0.2);
        let color = if note.is_drum { DRUM_COLOR } else { NOTE_COLOR };
        svg.note_rect(x, row_y(note.pitch) + 0.5, w, ROW_HEIGHT - 1.0, color, opacity, note.pitch);
    }

    svg.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_common::Note;

    #[test]
    fn test_one_rect_per_note() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(60, 127, 0.0, 0.5));
        seq.push_note(Note::new(67, 20, 0.5, 1.5));
        let mut drum = Note::new(36, 90, 0.0, 0.1);
        drum.is_drum = true;
        seq.push_note(drum);

        let svg = render_piano_roll(&seq);
        assert_eq!(svg.matches(r#"class="note""#).count(), 3);
        assert!(svg.contains(r#"fill-opacity="1.00""#));
        assert!(svg.contains(DRUM_COLOR));
    }

    #[test]
    fn test_black_key_rows_shaded() {
        let mut seq = NoteSequence::new();
        seq.push_note(Note::new(60, 100, 0.0, 1.0));
        let svg = render_piano_roll(&seq);
        // Rows 58..=62 contain two black keys (58, 61)
        assert_eq!(svg.matches(BLACK_KEY_ROW).count(), 2);
    }

    #[test]
    fn test_empty_sequence_renders_grid() {
        let svg = render_piano_roll(&NoteSequence::new());
        assert!(svg.starts_with("<svg"));
        assert!(!svg.contains(r#"class="note""#));
    }
}
