//! Spectrogram masking augmentation
//!
//! Frequency and time masks zero a contiguous band of mel bins or frames.
//! Whether any masking happens is gated per call by `rate`, and the policy
//! picks how many mask pairs are applied.

use crate::error::AudioError;
use ndarray::{Array3, Axis, Slice};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// How many frequency+time mask pairs an augmentation applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AugmentPolicy {
    /// One frequency mask then one time mask (policy id 1)
    Single,
    /// Two frequency+time mask pairs (policy id 2)
    Double,
    /// Coin flip between `Single` and `Double` (policy id 3)
    Mixed,
}

impl TryFrom<u8> for AugmentPolicy {
    type Error = AudioError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Self::Single),
            2 => Ok(Self::Double),
            3 => Ok(Self::Mixed),
            other => Err(AudioError::invalid_config(format!(
                "unknown augmentation policy {}, expected 1, 2 or 3",
                other
            ))),
        }
    }
}

impl From<AugmentPolicy> for u8 {
    fn from(policy: AugmentPolicy) -> u8 {
        match policy {
            AugmentPolicy::Single => 1,
            AugmentPolicy::Double => 2,
            AugmentPolicy::Mixed => 3,
        }
    }
}

/// Augmentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Probability of masking on a given call, 0.0 to 1.0
    pub rate: f32,
    pub policy: AugmentPolicy,
    /// Maximum frequency mask width in mel bins
    pub freq_mask: usize,
    /// Maximum time mask width in frames
    pub time_mask: usize,
}

impl AugmentConfig {
    pub fn new(rate: f32, policy: AugmentPolicy, freq_mask: usize, time_mask: usize) -> Self {
        Self {
            rate,
            policy,
            freq_mask,
            time_mask,
        }
    }
}

/// Axis of a (channel, mel, time) spectrogram that a mask runs along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskAxis {
    Frequency,
    Time,
}

impl MaskAxis {
    fn axis(self) -> Axis {
        match self {
            MaskAxis::Frequency => Axis(1),
            MaskAxis::Time => Axis(2),
        }
    }
}

/// Zero one random band of at most `max_width` entries along `axis`
///
/// The width is drawn uniformly from `[0, max_width)` and the start so that
/// the band fits inside the axis. The same band is applied to every channel.
/// Returns the zeroed index range, which may be empty.
pub fn mask_along_axis<R: Rng + ?Sized>(
    spectrogram: &mut Array3<f32>,
    axis: MaskAxis,
    max_width: usize,
    rng: &mut R,
) -> Range<usize> {
    let size = spectrogram.len_of(axis.axis());
    let width = rng.gen::<f32>() * max_width as f32;
    let offset = rng.gen::<f32>() * (size as f32 - width);

    // Negative offsets (band wider than the axis) saturate to 0
    let start = (offset.floor() as usize).min(size);
    let end = (start + width.floor() as usize).min(size);

    spectrogram
        .slice_axis_mut(axis.axis(), Slice::from(start..end))
        .fill(0.0);
    start..end
}

/// Stochastic masking transform for training spectrograms
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> Result<Self, AudioError> {
        if !(0.0..=1.0).contains(&config.rate) {
            return Err(AudioError::invalid_config(format!(
                "augmentation rate {} outside 0.0..=1.0",
                config.rate
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Mask `spectrogram` in place according to the configured policy
    ///
    /// Returns how many frequency+time mask pairs were applied (0 when the
    /// rate gate did not open).
    pub fn apply<R: Rng + ?Sized>(&self, spectrogram: &mut Array3<f32>, rng: &mut R) -> usize {
        let pairs = match self.config.policy {
            AugmentPolicy::Single => self.gated(spectrogram, 1, rng),
            AugmentPolicy::Double => self.gated(spectrogram, 2, rng),
            AugmentPolicy::Mixed => {
                if rng.gen::<f32>() > 0.5 {
                    self.gated(spectrogram, 1, rng)
                } else {
                    self.gated(spectrogram, 2, rng)
                }
            }
        };
        if pairs > 0 {
            debug!("Applied {} mask pair(s) ({:?})", pairs, self.config.policy);
        }
        pairs
    }

    fn gated<R: Rng + ?Sized>(&self, spectrogram: &mut Array3<f32>, pairs: usize, rng: &mut R) -> usize {
        let probability = rng.gen::<f32>();
        if self.config.rate <= probability {
            return 0;
        }
        for _ in 0..pairs {
            mask_along_axis(spectrogram, MaskAxis::Frequency, self.config.freq_mask, rng);
            mask_along_axis(spectrogram, MaskAxis::Time, self.config.time_mask, rng);
        }
        pairs
    }
}
