//! Standard MIDI File codec
//!
//! Decoding merges the tempo map of every track, pairs note-on/note-off
//! first-in first-out per (channel, key), treats note-on with velocity 0 as
//! note-off, closes dangling notes at the end of their track and tracks
//! program changes per channel. Channel 10 is percussion.
//!
//! Encoding writes SMF format 1: a conductor track with tempo and time
//! signature meta events, then one track per (instrument, program, drum)
//! group.

use super::CodecError;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Fps, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use sonic_common::note_sequence::{
    Note, NoteSequence, Tempo, TimeSignature, DEFAULT_TICKS_PER_QUARTER,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Zero-based MIDI channel reserved for percussion
const DRUM_CHANNEL: u8 = 9;

/// MIDI default tempo (120 qpm)
const DEFAULT_US_PER_QUARTER: f64 = 500_000.0;

/// Largest tick delta a track event can carry
const MAX_DELTA: u64 = (1 << 28) - 1;

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    us_per_quarter: f64,
}

/// Piecewise-linear tick ⇄ seconds mapping
#[derive(Debug, Clone)]
struct TempoMap {
    ticks_per_quarter: f64,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter: ticks_per_quarter.max(1) as f64,
            segments: vec![TempoSegment {
                tick: 0,
                seconds: 0.0,
                us_per_quarter: DEFAULT_US_PER_QUARTER,
            }],
        }
    }

    /// Add a tempo change; changes must arrive in tick order
    fn push_change(&mut self, tick: u64, us_per_quarter: f64) {
        let seconds = self.seconds_at(tick);
        match self.segments.last_mut() {
            Some(last) if last.tick == tick => last.us_per_quarter = us_per_quarter,
            _ => self.segments.push(TempoSegment {
                tick,
                seconds,
                us_per_quarter,
            }),
        }
    }

    fn from_tick_changes(ticks_per_quarter: u16, mut changes: Vec<(u64, f64)>) -> Self {
        changes.sort_by_key(|(tick, _)| *tick);
        let mut map = Self::new(ticks_per_quarter);
        for (tick, us) in changes {
            map.push_change(tick, us);
        }
        map
    }

    fn from_sequence(seq: &NoteSequence, ticks_per_quarter: u16) -> Self {
        let mut tempos: Vec<&Tempo> = seq.tempos.iter().filter(|t| t.qpm > 0.0).collect();
        tempos.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut map = Self::new(ticks_per_quarter);
        for tempo in tempos {
            let tick = map.tick_at(tempo.time.max(0.0));
            map.push_change(tick, 60_000_000.0 / tempo.qpm);
        }
        map
    }

    fn segment_for_tick(&self, tick: u64) -> &TempoSegment {
        let idx = self.segments.partition_point(|s| s.tick <= tick);
        &self.segments[idx.saturating_sub(1)]
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        let seg = self.segment_for_tick(tick);
        let quarters = (tick - seg.tick) as f64 / self.ticks_per_quarter;
        seg.seconds + quarters * seg.us_per_quarter / 1_000_000.0
    }

    fn tick_at(&self, seconds: f64) -> u64 {
        let idx = self.segments.partition_point(|s| s.seconds <= seconds);
        let seg = &self.segments[idx.saturating_sub(1)];
        let quarters = (seconds - seg.seconds).max(0.0) * 1_000_000.0 / seg.us_per_quarter;
        seg.tick + (quarters * self.ticks_per_quarter).round() as u64
    }
}

/// How file ticks map to seconds
enum Clock {
    Metrical(TempoMap),
    Timecode { seconds_per_tick: f64 },
}

impl Clock {
    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            Clock::Metrical(map) => map.seconds_at(tick),
            Clock::Timecode { seconds_per_tick } => tick as f64 * seconds_per_tick,
        }
    }
}

fn collect_tempo_changes(smf: &Smf) -> Vec<(u64, f64)> {
    let mut changes = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(us)) = event.kind {
                let us = us.as_int();
                if us > 0 {
                    changes.push((tick, us as f64));
                }
            }
        }
    }
    changes
}

fn round_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round().max(0.0) as u64
}

/// A note-on waiting for its note-off
struct PendingNote {
    start_time: f64,
    velocity: u8,
    program: u8,
}

/// Decode Standard MIDI File bytes into a NoteSequence
pub fn midi_to_note_sequence(bytes: &[u8]) -> Result<NoteSequence, CodecError> {
    let smf = Smf::parse(bytes).map_err(|e| CodecError::MidiParse(e.to_string()))?;

    let mut seq = NoteSequence::new();
    let clock = match smf.header.timing {
        Timing::Metrical(tpq) => {
            let tpq = tpq.as_int();
            if tpq == 0 {
                return Err(CodecError::MidiParse(
                    "header declares zero ticks per quarter".to_string(),
                ));
            }
            seq.ticks_per_quarter = tpq;
            let changes = collect_tempo_changes(&smf);
            let map = TempoMap::from_tick_changes(tpq, changes.clone());
            for (tick, us) in changes {
                seq.tempos.push(Tempo {
                    time: map.seconds_at(tick),
                    qpm: 60_000_000.0 / us,
                });
            }
            Clock::Metrical(map)
        }
        Timing::Timecode(fps, subframes) => {
            let frames_per_second = match fps {
                Fps::Fps24 => 24.0,
                Fps::Fps25 => 25.0,
                Fps::Fps29 => 29.97,
                Fps::Fps30 => 30.0,
            };
            if subframes == 0 {
                return Err(CodecError::MidiParse(
                    "timecode header declares zero subframes".to_string(),
                ));
            }
            seq.ticks_per_quarter = DEFAULT_TICKS_PER_QUARTER;
            Clock::Timecode {
                seconds_per_tick: 1.0 / (frames_per_second * subframes as f64),
            }
        }
    };

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick = 0u64;
        let mut programs = [0u8; 16];
        let mut pending: HashMap<(u8, u8), VecDeque<PendingNote>> = HashMap::new();

        for event in track {
            tick += event.delta.as_int() as u64;
            let time = clock.seconds_at(tick);

            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::ProgramChange { program } => {
                            programs[channel as usize] = program.as_int();
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((channel, key.as_int()))
                                .or_default()
                                .push_back(PendingNote {
                                    start_time: time,
                                    velocity: vel.as_int(),
                                    program: programs[channel as usize],
                                });
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let started = pending
                                .get_mut(&(channel, key.as_int()))
                                .and_then(|queue| queue.pop_front());
                            if let Some(note) = started {
                                seq.push_note(finish_note(
                                    note,
                                    key.as_int(),
                                    channel,
                                    track_idx,
                                    time,
                                ));
                            }
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denom_pow, _, _)) => {
                    if denom_pow <= 7 {
                        seq.time_signatures.push(TimeSignature {
                            time_ms: round_ms(time),
                            numerator,
                            denominator: 1u8 << denom_pow,
                        });
                    }
                }
                _ => {}
            }
        }

        // Close notes the track never released
        let track_end = clock.seconds_at(tick);
        let mut dangling = 0usize;
        for ((channel, key), queue) in pending {
            for note in queue {
                dangling += 1;
                seq.push_note(finish_note(note, key, channel, track_idx, track_end));
            }
        }
        if dangling > 0 {
            debug!(track = track_idx, dangling, "Closed unterminated notes at end of track");
        }
    }

    seq.sort();
    seq.time_signatures.sort_by_key(|ts| ts.time_ms);
    seq.time_signatures.dedup();

    debug!(
        notes = seq.len(),
        tracks = smf.tracks.len(),
        total_time = seq.total_time,
        "Decoded MIDI file"
    );
    Ok(seq)
}

fn finish_note(note: PendingNote, key: u8, channel: u8, track_idx: usize, end_time: f64) -> Note {
    Note {
        pitch: key,
        velocity: note.velocity,
        start_time: note.start_time,
        end_time,
        program: note.program,
        instrument: track_idx as u32,
        is_drum: channel == DRUM_CHANNEL,
    }
}

/// Event ordering at equal ticks: meta first, releases before onsets
fn event_priority(kind: &TrackEventKind) -> u8 {
    match kind {
        TrackEventKind::Meta(_) => 0,
        TrackEventKind::Midi {
            message: MidiMessage::ProgramChange { .. },
            ..
        } => 1,
        TrackEventKind::Midi {
            message: MidiMessage::NoteOff { .. },
            ..
        } => 2,
        _ => 3,
    }
}

/// Convert absolute-tick events into a delta-encoded track
fn build_track(mut events: Vec<(u64, TrackEventKind<'static>)>) -> Vec<TrackEvent<'static>> {
    events.sort_by_key(|(tick, kind)| (*tick, event_priority(kind)));

    let mut track = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u64;
    for (tick, kind) in events {
        let delta = (tick - last_tick).min(MAX_DELTA);
        last_tick = tick;
        track.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind,
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn clamp7(value: u8) -> u7 {
    u7::new(value.min(127))
}

/// Encode a NoteSequence as a format 1 Standard MIDI File
pub fn note_sequence_to_midi(seq: &NoteSequence) -> Result<Vec<u8>, CodecError> {
    let tpq = match seq.ticks_per_quarter {
        0 => DEFAULT_TICKS_PER_QUARTER,
        tpq => tpq.min(0x7FFF),
    };
    let tempo_map = TempoMap::from_sequence(seq, tpq);

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(tpq)),
    ));

    // Conductor track
    let mut conductor: Vec<(u64, TrackEventKind<'static>)> = Vec::new();
    for segment in &tempo_map.segments {
        let us = segment.us_per_quarter.round().clamp(1.0, 0xFF_FFFF as f64) as u32;
        conductor.push((
            segment.tick,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us))),
        ));
    }
    for ts in &seq.time_signatures {
        if ts.numerator == 0 || !ts.denominator.is_power_of_two() {
            continue;
        }
        let tick = tempo_map.tick_at(ts.time_ms as f64 / 1000.0);
        conductor.push((
            tick,
            TrackEventKind::Meta(MetaMessage::TimeSignature(
                ts.numerator,
                ts.denominator.trailing_zeros() as u8,
                24,
                8,
            )),
        ));
    }
    smf.tracks.push(build_track(conductor));

    // One track per voice
    let mut groups: BTreeMap<(u32, u8, bool), Vec<&Note>> = BTreeMap::new();
    for note in &seq.notes {
        groups
            .entry((note.instrument, note.program, note.is_drum))
            .or_default()
            .push(note);
    }

    let mut melodic_channels = (0u8..16).filter(|c| *c != DRUM_CHANNEL).cycle();
    for ((_, program, is_drum), notes) in groups {
        let channel = if is_drum {
            DRUM_CHANNEL
        } else {
            melodic_channels.next().unwrap_or(0)
        };
        let ch = u4::new(channel);

        let mut events: Vec<(u64, TrackEventKind<'static>)> = Vec::with_capacity(notes.len() * 2 + 1);
        if !is_drum {
            events.push((
                0,
                TrackEventKind::Midi {
                    channel: ch,
                    message: MidiMessage::ProgramChange {
                        program: clamp7(program),
                    },
                },
            ));
        }
        for note in notes {
            let on = tempo_map.tick_at(note.start_time.max(0.0));
            let off = tempo_map.tick_at(note.end_time.max(note.start_time).max(0.0));
            events.push((
                on,
                TrackEventKind::Midi {
                    channel: ch,
                    message: MidiMessage::NoteOn {
                        key: clamp7(note.pitch),
                        vel: u7::new(note.velocity.clamp(1, 127)),
                    },
                },
            ));
            events.push((
                off,
                TrackEventKind::Midi {
                    channel: ch,
                    message: MidiMessage::NoteOff {
                        key: clamp7(note.pitch),
                        vel: u7::new(0),
                    },
                },
            ));
        }
        smf.tracks.push(build_track(events));
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    debug!(
        notes = seq.len(),
        tracks = smf.tracks.len(),
        bytes = bytes.len(),
        "Encoded MIDI file"
    );
    Ok(bytes)
}
