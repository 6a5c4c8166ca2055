//! Log-mel spectrogram extraction
//!
//! Short-time Fourier analysis with a periodic Hann window, centered frames
//! (reflect padding of `n_fft / 2` on both sides), power spectrum, HTK mel
//! filterbank, then `ln(x + 1e-14)`.

use crate::error::{AudioError, Result};
use crate::waveform::Waveform;
use ndarray::{Array2, Array3, ArrayView1, Axis};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::debug;

/// Added before the logarithm so silent bins stay finite
pub const LOG_EPSILON: f32 = 1e-14;

/// FFT size used when none is configured
pub const DEFAULT_N_FFT: usize = 400;

/// Feature extractor configuration
///
/// There is deliberately no `Default`: sample rate, mel count, window and hop
/// have to be chosen by whoever builds the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of mel bins
    pub n_mels: usize,
    /// Window length in samples
    pub win_length: usize,
    /// Hop between frames in samples
    pub hop_length: usize,
    /// FFT size, must be >= win_length
    pub n_fft: usize,
    /// Lower frequency bound of the filterbank
    pub f_min: f32,
    /// Upper frequency bound, Nyquist when unset
    pub f_max: Option<f32>,
}

impl FeatureConfig {
    pub fn new(sample_rate: u32, n_mels: usize, win_length: usize, hop_length: usize) -> Self {
        Self {
            sample_rate,
            n_mels,
            win_length,
            hop_length,
            n_fft: DEFAULT_N_FFT,
            f_min: 0.0,
            f_max: None,
        }
    }

    pub fn with_n_fft(mut self, n_fft: usize) -> Self {
        self.n_fft = n_fft;
        self
    }

    pub fn with_freq_range(mut self, f_min: f32, f_max: f32) -> Self {
        self.f_min = f_min;
        self.f_max = Some(f_max);
        self
    }

    /// Number of frequency bins in the one-sided spectrum
    pub fn n_freqs(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frames produced for `num_samples` input samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        let padded = num_samples + 2 * (self.n_fft / 2);
        (padded - self.n_fft) / self.hop_length + 1
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::invalid_config("sample_rate must be positive"));
        }
        if self.n_mels == 0 {
            return Err(AudioError::invalid_config("n_mels must be positive"));
        }
        if self.hop_length == 0 || self.win_length == 0 {
            return Err(AudioError::invalid_config("win_length and hop_length must be positive"));
        }
        if self.win_length > self.n_fft {
            return Err(AudioError::invalid_config(format!(
                "win_length ({}) exceeds n_fft ({})",
                self.win_length, self.n_fft
            )));
        }
        let f_max = self.f_max.unwrap_or(self.sample_rate as f32 / 2.0);
        if self.f_min < 0.0 || f_max <= self.f_min {
            return Err(AudioError::invalid_config(format!(
                "invalid frequency range {}..{}",
                self.f_min, f_max
            )));
        }
        Ok(())
    }
}

/// Waveform to log-mel spectrogram
///
/// Holds only read-only state after construction, so one extractor can be
/// shared by every loader thread.
pub struct FeatureExtractor {
    config: FeatureConfig,
    /// Shape (n_mels, n_fft/2 + 1)
    mel_filters: Array2<f32>,
    /// Hann window zero-padded to n_fft
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;

        let mel_filters = create_mel_filterbank(
            config.n_mels,
            config.n_fft,
            config.sample_rate as f32,
            config.f_min,
            config.f_max.unwrap_or(config.sample_rate as f32 / 2.0),
        );
        let window = padded_hann_window(config.win_length, config.n_fft);
        let fft = FftPlanner::new().plan_fft_forward(config.n_fft);

        Ok(Self {
            config,
            mel_filters,
            window,
            fft,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Log-mel spectrogram of every channel
    ///
    /// Returns shape (channels, n_mels, frames).
    pub fn extract(&self, waveform: &Waveform) -> Result<Array3<f32>> {
        if waveform.sample_rate() != self.config.sample_rate {
            debug!(
                "Waveform is {} Hz, extractor configured for {} Hz",
                waveform.sample_rate(),
                self.config.sample_rate
            );
        }

        let per_channel = (0..waveform.channels())
            .map(|ch| self.extract_channel(waveform.channel(ch)))
            .collect::<Result<Vec<_>>>()?;

        let views: Vec<_> = per_channel.iter().map(|m| m.view()).collect();
        let spectrogram = ndarray::stack(Axis(0), &views)
            .map_err(|e| AudioError::feature_extraction(e.to_string()))?;

        debug!("Extracted log-mel spectrogram {:?}", spectrogram.shape());
        Ok(spectrogram)
    }

    /// Log-mel spectrogram of one channel, shape (n_mels, frames)
    pub fn extract_channel(&self, samples: ArrayView1<'_, f32>) -> Result<Array2<f32>> {
        let power = self.power_spectrogram(samples)?;
        // (frames, freqs) x (freqs, n_mels) -> (frames, n_mels)
        let mel = power.dot(&self.mel_filters.t());
        Ok(mel.t().mapv(|x| (x + LOG_EPSILON).ln()))
    }

    /// Power spectrogram, shape (frames, n_fft/2 + 1)
    fn power_spectrogram(&self, samples: ArrayView1<'_, f32>) -> Result<Array2<f32>> {
        let samples: Vec<f32> = samples.iter().copied().collect();
        let padded = reflect_pad(&samples, self.config.n_fft / 2)?;

        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let num_frames = self.config.num_frames(samples.len());
        let n_freqs = self.config.n_freqs();

        let mut power = Array2::zeros((num_frames, n_freqs));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }

            self.fft.process(&mut buffer);

            for (i, c) in buffer.iter().take(n_freqs).enumerate() {
                power[[frame_idx, i]] = c.re * c.re + c.im * c.im;
            }
        }

        Ok(power)
    }
}

/// Mirror `pad` samples onto both ends, excluding the edge sample itself
fn reflect_pad(samples: &[f32], pad: usize) -> Result<Vec<f32>> {
    if samples.len() <= pad {
        return Err(AudioError::invalid_input(format!(
            "Audio too short for feature extraction: {} samples, need more than {}",
            samples.len(),
            pad
        )));
    }

    let len = samples.len();
    let mut padded = Vec::with_capacity(len + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| samples[i]));
    padded.extend_from_slice(samples);
    padded.extend((1..=pad).map(|i| samples[len - 1 - i]));
    Ok(padded)
}

/// Periodic Hann window of `win_length`, centered in `n_fft` zeros
fn padded_hann_window(win_length: usize, n_fft: usize) -> Vec<f32> {
    let offset = (n_fft - win_length) / 2;
    let mut window = vec![0.0; n_fft];
    for n in 0..win_length {
        let factor = 2.0 * PI * n as f32 / win_length as f32;
        window[offset + n] = 0.5 - 0.5 * factor.cos();
    }
    window
}

/// Convert Hz to mel scale (HTK)
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale to Hz (HTK)
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Create mel filterbank matrix
///
/// Returns a matrix of shape (n_mels, n_fft/2 + 1) where each row is a
/// triangular filter over linearly spaced FFT bin frequencies. Filters that
/// fall between two bins stay all-zero.
fn create_mel_filterbank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: f32,
    fmin: f32,
    fmax: f32,
) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let hz_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate / n_fft as f32;

    let mut filterbank = Array2::zeros((n_mels, freq_bins));

    for mel_idx in 0..n_mels {
        let left = hz_points[mel_idx];
        let center = hz_points[mel_idx + 1];
        let right = hz_points[mel_idx + 2];

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;
            let rising = (freq - left) / (center - left);
            let falling = (right - freq) / (right - center);
            filterbank[[mel_idx, freq_idx]] = rising.min(falling).max(0.0);
        }
    }

    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::new(8000, 81, 160, 80)).unwrap()
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_output_shape() {
        let waveform = Waveform::mono(sine(440.0, 8000, 3120), 8000).unwrap();
        let spec = extractor().extract(&waveform).unwrap();
        assert_eq!(spec.shape(), &[1, 81, 40]);
    }

    #[test]
    fn test_num_frames_matches_extraction() {
        let config = FeatureConfig::new(8000, 81, 160, 80);
        let fe = FeatureExtractor::new(config.clone()).unwrap();
        for len in [201, 800, 1999, 8000] {
            let waveform = Waveform::mono(sine(300.0, 8000, len), 8000).unwrap();
            let spec = fe.extract(&waveform).unwrap();
            assert_eq!(spec.shape()[2], config.num_frames(len));
        }
    }

    #[test]
    fn test_num_frames_with_odd_fft_size() {
        let config = FeatureConfig::new(8000, 40, 160, 80).with_n_fft(401);
        let fe = FeatureExtractor::new(config.clone()).unwrap();
        assert_eq!(config.num_frames(800), 10);
        for len in [800, 1601, 3120] {
            let waveform = Waveform::mono(sine(300.0, 8000, len), 8000).unwrap();
            let spec = fe.extract(&waveform).unwrap();
            assert_eq!(spec.shape()[2], config.num_frames(len));
        }
    }

    #[test]
    fn test_silence_is_finite() {
        let waveform = Waveform::mono(vec![0.0; 1600], 8000).unwrap();
        let spec = extractor().extract(&waveform).unwrap();
        assert!(spec.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(spec[[0, 10, 5]], LOG_EPSILON.ln(), epsilon = 1e-3);
    }

    #[test]
    fn test_stereo_keeps_channel_axis() {
        let mut interleaved = Vec::new();
        for s in sine(440.0, 8000, 1600) {
            interleaved.push(s);
            interleaved.push(-s);
        }
        let waveform = Waveform::from_interleaved(&interleaved, 2, 8000).unwrap();
        let spec = extractor().extract(&waveform).unwrap();
        assert_eq!(spec.shape(), &[2, 81, 21]);
    }

    #[test]
    fn test_tone_energy_lands_in_matching_band() {
        let config = FeatureConfig::new(16000, 40, 400, 160);
        let fe = FeatureExtractor::new(config).unwrap();
        let low = Waveform::mono(sine(300.0, 16000, 16000), 16000).unwrap();
        let high = Waveform::mono(sine(5000.0, 16000, 16000), 16000).unwrap();

        let peak_bin = |w: &Waveform| {
            let spec = fe.extract(w).unwrap();
            let column = spec.index_axis(Axis(0), 0).column(50).to_owned();
            column
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        };

        assert!(peak_bin(&low) < peak_bin(&high));
    }

    #[test]
    fn test_too_short_audio() {
        let waveform = Waveform::mono(vec![0.1; 100], 8000).unwrap();
        let err = extractor().extract(&waveform).unwrap_err();
        assert!(matches!(err, AudioError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_config() {
        assert!(FeatureExtractor::new(FeatureConfig::new(8000, 81, 500, 80)).is_err());
        assert!(FeatureExtractor::new(FeatureConfig::new(8000, 0, 160, 80)).is_err());
        assert!(FeatureExtractor::new(FeatureConfig::new(8000, 81, 160, 0)).is_err());
    }

    #[test]
    fn test_reflect_pad() {
        let padded = reflect_pad(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_window_is_centered() {
        let window = padded_hann_window(160, 400);
        assert_eq!(window.len(), 400);
        assert_eq!(window[119], 0.0);
        assert_eq!(window[120], 0.0);
        assert_abs_diff_eq!(window[200], 1.0, epsilon = 1e-6);
        assert_eq!(window[280], 0.0);
    }

    #[test]
    fn test_mel_filterbank_shape() {
        let fb = create_mel_filterbank(81, 400, 8000.0, 0.0, 4000.0);
        assert_eq!(fb.shape(), &[81, 201]);
        assert!(fb.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_mel_conversion() {
        let hz = 1000.0;
        let hz_back = mel_to_hz(hz_to_mel(hz));
        assert!((hz - hz_back).abs() < 0.1);
    }
}
