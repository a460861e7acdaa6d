//! Audio Test Fixture Generator
//!
//! In-memory WAV files with a steady sine tone

use std::io::Cursor;

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency_hz: f32,
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 1.0,
            sample_rate: 44100,
            channels: 1,
            frequency_hz: 440.0,
            amplitude: 0.5,
        }
    }
}

/// 16-bit PCM WAV bytes for `config`
pub fn sine_wav_bytes(config: &AudioConfig) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;
        for i in 0..total_samples {
            let t = i as f32 / config.sample_rate as f32;
            let value = config.amplitude
                * (2.0 * std::f32::consts::PI * config.frequency_hz * t).sin()
                * i16::MAX as f32;
            for _ in 0..config.channels {
                writer.write_sample(value as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
