//! Mono sample rate conversion using rubato

use super::AudioError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Resample mono audio from `input_rate` to `output_rate`
///
/// Returns a copy when the rates already match. The whole input is
/// processed as a single chunk.
pub fn resample_mono(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>, AudioError> {
    if input_rate == 0 || output_rate == 0 {
        return Err(AudioError::Resample(format!(
            "Invalid sample rates {} -> {}",
            input_rate, output_rate
        )));
    }
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input.len(),
        1,
    )
    .map_err(|e| AudioError::Resample(format!("Failed to create resampler: {}", e)))?;

    let mut output = resampler
        .process(&[input], None)
        .map_err(|e| AudioError::Resample(format!("Resampling failed: {}", e)))?;

    let samples = output.pop().unwrap_or_default();
    debug!(
        input_rate,
        output_rate,
        input_frames = input.len(),
        output_frames = samples.len(),
        "Resampled audio"
    );
    Ok(samples)
}
