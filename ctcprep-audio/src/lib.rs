//! Audio front end for CTC speech training data
//!
//! Turns audio files into log-mel spectrograms and perturbs them with
//! frequency/time masking for training.
//!
//! ## Architecture
//!
//! ```text
//! audio file (wav / mp3 / flac / ogg)
//!   │
//!   ├─> Waveform (channels, samples)      hound / symphonia
//!   │     │
//!   │     └─> resample (optional)         rubato
//!   │
//!   ├─> FeatureExtractor                  rustfft, ndarray
//!   │     └─> (channels, n_mels, frames) log-mel
//!   │
//!   └─> Augmenter (training only)         rand
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use ctcprep_audio::{FeatureConfig, FeatureExtractor, Waveform};
//!
//! let extractor = FeatureExtractor::new(FeatureConfig::new(8000, 81, 160, 80))?;
//! let waveform = Waveform::load("clip.wav")?;
//! let spectrogram = extractor.extract(&waveform)?;
//! println!("shape: {:?}", spectrogram.shape());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod augment;
pub mod error;
pub mod features;
pub mod resampler;
pub mod waveform;

pub use augment::{AugmentConfig, AugmentPolicy, Augmenter, MaskAxis};
pub use error::{AudioError, Result};
pub use features::{FeatureConfig, FeatureExtractor, LOG_EPSILON};
pub use resampler::resample;
pub use waveform::{FileLoader, Waveform, WaveformLoader};
