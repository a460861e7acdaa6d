//! Built-in monophonic transcription engine
//!
//! Frame-wise YIN pitch estimation followed by note segmentation:
//! 1. Decode the upload to mono PCM and resample to the analysis rate
//! 2. Per frame: RMS gate, then YIN fundamental estimate
//! 3. Median-filter the frame pitches
//! 4. Split notes on pitch change, silence or an energy re-attack
//! 5. Drop notes shorter than `min_note_seconds`; velocity follows peak level

use super::{ModelError, TranscriptionEngine};
use crate::audio::{decode_audio_bytes, resample_mono};
use crate::intake::UploadedFile;
use async_trait::async_trait;
use sonic_common::config::ModelConfig;
use sonic_common::note_sequence::{Note, NoteSequence};
use tracing::{debug, info};

/// Half-width of the pitch median filter, in frames
const MEDIAN_RADIUS: usize = 2;

/// RMS jump (relative to the previous frame) counted as a re-attack
const ONSET_RATIO: f32 = 2.0;

/// Quietest level mapped to velocity 1
const VELOCITY_FLOOR_DB: f32 = -60.0;

/// YIN-based transcription engine
pub struct PitchTrackerEngine {
    config: ModelConfig,
}

impl PitchTrackerEngine {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TranscriptionEngine for PitchTrackerEngine {
    fn name(&self) -> &'static str {
        "yin-pitch-tracker"
    }

    async fn initialize(&self) -> Result<(), ModelError> {
        let c = &self.config;
        if c.sample_rate == 0 || c.hop_size == 0 || c.frame_size < 2 * c.hop_size {
            return Err(ModelError::Init(format!(
                "Unusable analysis geometry: {} Hz, frame {}, hop {}",
                c.sample_rate, c.frame_size, c.hop_size
            )));
        }
        if !(c.min_frequency_hz > 0.0 && c.min_frequency_hz < c.max_frequency_hz) {
            return Err(ModelError::Init(format!(
                "Empty frequency range {}..{} Hz",
                c.min_frequency_hz, c.max_frequency_hz
            )));
        }
        info!(
            sample_rate = c.sample_rate,
            frame_size = c.frame_size,
            hop_size = c.hop_size,
            "Pitch tracker configured"
        );
        Ok(())
    }

    async fn transcribe(&self, file: &UploadedFile) -> Result<NoteSequence, ModelError> {
        let bytes = file.read_all().await?;
        let name = file.name().to_string();
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || -> Result<NoteSequence, ModelError> {
            let audio = decode_audio_bytes(bytes, &name)?;
            let samples = resample_mono(&audio.samples, audio.sample_rate, config.sample_rate)?;
            let seq = transcribe_pcm(&samples, &config);
            debug!(
                file = %name,
                seconds = audio.duration_seconds(),
                notes = seq.len(),
                "Pitch tracking complete"
            );
            Ok(seq)
        })
        .await
        .map_err(|e| ModelError::Transcription(format!("Transcription task failed: {}", e)))?
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// YIN fundamental frequency estimate for one frame
///
/// Returns `None` when no lag in the allowed range dips below `threshold`.
fn yin_frequency(frame: &[f32], config: &ModelConfig) -> Option<f32> {
    let sample_rate = config.sample_rate as f32;
    let half = frame.len() / 2;
    let tau_min = ((sample_rate / config.max_frequency_hz).floor() as usize).max(2);
    let tau_max = ((sample_rate / config.min_frequency_hz).ceil() as usize).min(half.saturating_sub(1));
    if tau_min >= tau_max {
        return None;
    }

    let mut diff = vec![0.0f32; tau_max + 1];
    for (tau, slot) in diff.iter_mut().enumerate().skip(1) {
        *slot = (0..half)
            .map(|j| {
                let d = frame[j] - frame[j + tau];
                d * d
            })
            .sum();
    }

    // Cumulative mean normalized difference
    let mut cmnd = vec![1.0f32; tau_max + 1];
    let mut running = 0.0f32;
    for tau in 1..=tau_max {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 {
            diff[tau] * tau as f32 / running
        } else {
            1.0
        };
    }

    let mut tau = tau_min;
    let mut found = None;
    while tau <= tau_max {
        if cmnd[tau] < config.yin_threshold {
            while tau < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            found = Some(tau);
            break;
        }
        tau += 1;
    }
    let tau = found?;

    let refined = if tau > 1 && tau < tau_max {
        let (s0, s1, s2) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
        let denom = s0 - 2.0 * s1 + s2;
        if denom.abs() > f32::EPSILON {
            tau as f32 + 0.5 * (s0 - s2) / denom
        } else {
            tau as f32
        }
    } else {
        tau as f32
    };

    Some(sample_rate / refined)
}

fn frequency_to_midi(frequency: f32) -> Option<u8> {
    let midi = (69.0 + 12.0 * (frequency / 440.0).log2()).round();
    (0.0..=127.0).contains(&midi).then_some(midi as u8)
}

fn velocity_from_rms(level: f32) -> u8 {
    let db = 20.0 * level.max(1e-9).log10();
    let scaled = (db - VELOCITY_FLOOR_DB) / -VELOCITY_FLOOR_DB * 126.0 + 1.0;
    scaled.round().clamp(1.0, 127.0) as u8
}

/// Smooth isolated octave/semitone glitches; unvoiced frames stay unvoiced
fn median_filter(pitches: &[Option<u8>]) -> Vec<Option<u8>> {
    (0..pitches.len())
        .map(|i| {
            pitches[i]?;
            let lo = i.saturating_sub(MEDIAN_RADIUS);
            let hi = (i + MEDIAN_RADIUS + 1).min(pitches.len());
            let mut window: Vec<u8> = pitches[lo..hi].iter().flatten().copied().collect();
            window.sort_unstable();
            window.get(window.len() / 2).copied()
        })
        .collect()
}

struct OpenNote {
    pitch: u8,
    first_frame: usize,
    last_frame: usize,
    peak_rms: f32,
}

/// Transcribe mono PCM already at `config.sample_rate`
pub fn transcribe_pcm(samples: &[f32], config: &ModelConfig) -> NoteSequence {
    let mut seq = NoteSequence::new();
    if config.hop_size == 0 || samples.len() < config.frame_size {
        return seq;
    }

    let frame_count = (samples.len() - config.frame_size) / config.hop_size + 1;
    let mut levels = Vec::with_capacity(frame_count);
    let mut raw = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        let start = i * config.hop_size;
        let frame = &samples[start..start + config.frame_size];
        let level = rms(frame);
        levels.push(level);
        raw.push(if level < config.min_rms {
            None
        } else {
            yin_frequency(frame, config).and_then(frequency_to_midi)
        });
    }
    let pitches = median_filter(&raw);

    let hop_seconds = config.hop_size as f64 / config.sample_rate as f64;
    let mut finished: Vec<OpenNote> = Vec::new();
    let mut current: Option<OpenNote> = None;

    for (i, pitch) in pitches.iter().enumerate() {
        let reattack = i > 0 && levels[i] > levels[i - 1] * ONSET_RATIO;
        match (current.as_mut(), pitch) {
            (Some(note), Some(p)) if note.pitch == *p && !reattack => {
                note.last_frame = i;
                note.peak_rms = note.peak_rms.max(levels[i]);
                continue;
            }
            _ => {}
        }
        if let Some(note) = current.take() {
            finished.push(note);
        }
        current = pitch.map(|p| OpenNote {
            pitch: p,
            first_frame: i,
            last_frame: i,
            peak_rms: levels[i],
        });
    }
    finished.extend(current);

    for note in finished {
        let start = note.first_frame as f64 * hop_seconds;
        let end = (note.last_frame + 1) as f64 * hop_seconds;
        if end - start < config.min_note_seconds {
            continue;
        }
        seq.push_note(Note::new(
            note.pitch,
            velocity_from_rms(note.peak_rms),
            start,
            end,
        ));
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_a440_is_pitch_69() {
        let config = ModelConfig::default();
        let seq = transcribe_pcm(&sine(440.0, config.sample_rate, 1.0, 0.5), &config);

        assert!(!seq.is_empty());
        let longest = seq
            .notes
            .iter()
            .max_by(|a, b| a.duration().total_cmp(&b.duration()))
            .unwrap();
        assert_eq!(longest.pitch, 69);
        assert!(longest.duration() > 0.8);
    }

    #[test]
    fn test_two_tones_give_two_notes() {
        let config = ModelConfig::default();
        let mut samples = sine(261.63, config.sample_rate, 0.5, 0.5);
        samples.extend(sine(392.0, config.sample_rate, 0.5, 0.5));
        let seq = transcribe_pcm(&samples, &config);

        let pitches: Vec<u8> = seq.notes.iter().map(|n| n.pitch).collect();
        assert!(pitches.contains(&60));
        assert!(pitches.contains(&67));
    }

    #[test]
    fn test_silence_yields_no_notes() {
        let config = ModelConfig::default();
        let seq = transcribe_pcm(&vec![0.0; 16_000], &config);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_short_input_yields_no_notes() {
        let config = ModelConfig::default();
        assert!(transcribe_pcm(&[0.3; 100], &config).is_empty());
    }

    #[test]
    fn test_velocity_scale() {
        assert_eq!(velocity_from_rms(1.0), 127);
        assert_eq!(velocity_from_rms(0.0), 1);
        let mid = velocity_from_rms(0.03);
        assert!(mid > 1 && mid < 127);
    }

    #[test]
    fn test_median_filter_removes_single_glitch() {
        let input = [Some(60), Some(60), Some(72), Some(60), Some(60), None];
        let filtered = median_filter(&input);
        assert_eq!(filtered[2], Some(60));
        assert_eq!(filtered[5], None);
    }

    #[tokio::test]
    async fn test_engine_transcribes_wav_upload() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in sine(440.0, 44_100, 1.0, 0.5) {
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let engine = PitchTrackerEngine::new(ModelConfig::default());
        engine.initialize().await.unwrap();
        let file = UploadedFile::from_bytes("a440.wav", cursor.into_inner());
        let seq = engine.transcribe(&file).await.unwrap();

        assert!(seq.notes.iter().any(|n| n.pitch == 69));
    }

    #[tokio::test]
    async fn test_engine_rejects_bad_geometry() {
        let config = ModelConfig {
            hop_size: 0,
            ..ModelConfig::default()
        };
        let engine = PitchTrackerEngine::new(config);
        assert!(matches!(engine.initialize().await, Err(ModelError::Init(_))));
    }
}
