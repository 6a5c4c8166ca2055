//! Variable-length batch collation
//!
//! Spectrograms are zero-padded along time and labels padded to the longest
//! label. The true lengths travel next to the padded tensors in input
//! order; the CTC loss reads them instead of a mask.

use ndarray::{s, Array2, Array4};

use crate::config::DataConfig;
use crate::dataset::Sample;
use crate::error::{DataError, Result};

/// One padded training batch
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Shape (batch, 1, n_mels, max_frames)
    pub spectrograms: Array4<f32>,
    /// Shape (batch, max_label_len)
    pub labels: Array2<i64>,
    /// Per-sample `spec_len`, in batch order
    pub input_lengths: Vec<usize>,
    /// Per-sample `label_len`, in batch order
    pub label_lengths: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.input_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_lengths.is_empty()
    }

    pub fn max_frames(&self) -> usize {
        self.spectrograms.shape()[3]
    }

    pub fn max_label_len(&self) -> usize {
        self.labels.ncols()
    }
}

/// Pads samples into a [`Batch`]
#[derive(Debug, Clone, Copy)]
pub struct BatchCollator {
    label_pad: i64,
}

impl BatchCollator {
    pub fn new(label_pad: i64) -> Self {
        Self { label_pad }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(config.label_pad)
    }

    pub fn label_pad(&self) -> i64 {
        self.label_pad
    }

    /// Collate samples; `None` entries are dropped from the batch
    ///
    /// Every sample must have one channel and the same mel count.
    pub fn collate<I>(&self, samples: I) -> Result<Batch>
    where
        I: IntoIterator<Item = Option<Sample>>,
    {
        let samples: Vec<Sample> = samples.into_iter().flatten().collect();
        let first = samples.first().ok_or(DataError::EmptyBatch)?;
        let n_mels = first.n_mels();

        for (i, sample) in samples.iter().enumerate() {
            if sample.channels() != 1 {
                return Err(DataError::shape_mismatch(format!(
                    "sample {} has {} channels, expected 1",
                    i,
                    sample.channels()
                )));
            }
            if sample.n_mels() != n_mels {
                return Err(DataError::shape_mismatch(format!(
                    "sample {} has {} mel bins, batch has {}",
                    i,
                    sample.n_mels(),
                    n_mels
                )));
            }
        }

        let max_frames = samples.iter().map(Sample::frames).max().unwrap_or(0);
        let max_label_len = samples.iter().map(|s| s.label.len()).max().unwrap_or(0);

        let mut spectrograms = Array4::zeros((samples.len(), 1, n_mels, max_frames));
        let mut labels = Array2::from_elem((samples.len(), max_label_len), self.label_pad);

        for (i, sample) in samples.iter().enumerate() {
            let frames = sample.frames();
            spectrograms
                .slice_mut(s![i, 0, .., ..frames])
                .assign(&sample.spectrogram.slice(s![0, .., ..]));

            for (j, &id) in sample.label.iter().enumerate() {
                labels[[i, j]] = id as i64;
            }
        }

        Ok(Batch {
            spectrograms,
            labels,
            input_lengths: samples.iter().map(|s| s.spec_len).collect(),
            label_lengths: samples.iter().map(|s| s.label_len).collect(),
        })
    }

    /// Collate samples that are all present
    pub fn collate_samples(&self, samples: Vec<Sample>) -> Result<Batch> {
        self.collate(samples.into_iter().map(Some))
    }
}

impl Default for BatchCollator {
    fn default() -> Self {
        Self::new(0)
    }
}
