//! Waveform resampling with rubato
//!
//! Only used when the dataset is configured to bring every file to the
//! feature extractor's sample rate.

use ndarray::Array2;
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::error::{AudioError, Result};
use crate::waveform::Waveform;

/// Resample a whole waveform to `target_rate`
///
/// Every channel is resampled; channel count is preserved.
pub fn resample(waveform: &Waveform, target_rate: u32) -> Result<Waveform> {
    let source_rate = waveform.sample_rate();
    if target_rate == 0 {
        return Err(AudioError::invalid_config("Target sample rate cannot be zero"));
    }
    if source_rate == target_rate || waveform.is_empty() {
        return Waveform::new(waveform.samples().clone(), target_rate);
    }

    debug!("Resampling from {} Hz to {} Hz", source_rate, target_rate);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let channels = waveform.channels();
    let frames = waveform.len();
    let ratio = target_rate as f64 / source_rate as f64;
    let expected = (frames as f64 * ratio).round() as usize;

    // One chunk spanning the whole file
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)
        .map_err(|e| AudioError::ResampleError(format!("Failed to create resampler: {:?}", e)))?;

    let planar_input: Vec<Vec<f32>> = (0..channels)
        .map(|ch| waveform.channel(ch).to_vec())
        .collect();

    let mut planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;

    // The filter holds back the tail until it is fed past the end of input
    while planar_output.first().map_or(0, |c| c.len()) < expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::ResampleError(format!("Flushing resampler failed: {:?}", e)))?;
        if tail.first().map_or(true, |c| c.is_empty()) {
            break;
        }
        for (out, rest) in planar_output.iter_mut().zip(tail) {
            out.extend(rest);
        }
    }

    let output_frames = planar_output
        .first()
        .map_or(0, |c| c.len())
        .min(expected);
    let samples = Array2::from_shape_fn((channels, output_frames), |(ch, i)| planar_output[ch][i]);

    Waveform::new(samples, target_rate)
}
