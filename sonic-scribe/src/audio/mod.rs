//! Audio front end for the built-in transcription engine
//!
//! Decodes uploaded bytes to mono f32 PCM and resamples them to the
//! analysis rate.

mod decode;
mod resample;

pub use decode::{decode_audio_bytes, DecodedAudio};
pub use resample::resample_mono;

use thiserror::Error;

/// Audio front-end errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// Container or codec could not be read
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Sample rate conversion failed
    #[error("Resampling error: {0}")]
    Resample(String),
}
