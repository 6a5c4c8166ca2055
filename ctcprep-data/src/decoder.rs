//! Greedy CTC decoding
//!
//! Arg-max per frame, drop blanks, collapse immediate repeats. Targets are
//! decoded through the same codec so predictions and references compare as
//! plain strings.

use ndarray::{ArrayView1, ArrayView2, ArrayView3, Axis};

use crate::error::{DataError, Result};
use crate::text::{TextCodec, BLANK_ID};

/// Decoded predictions and references, index-aligned with the batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBatch {
    pub predictions: Vec<String>,
    pub targets: Vec<String>,
}

/// Best-path CTC decoder
#[derive(Debug, Clone)]
pub struct GreedyDecoder {
    codec: TextCodec,
    blank_id: usize,
    collapse_repeated: bool,
}

impl GreedyDecoder {
    pub fn new(codec: TextCodec) -> Self {
        Self {
            codec,
            blank_id: BLANK_ID,
            collapse_repeated: true,
        }
    }

    /// Use a different blank id; it must not collide with a character id
    pub fn with_blank_id(mut self, blank_id: usize) -> Result<Self> {
        if blank_id < self.codec.vocab_size() {
            return Err(DataError::config(format!(
                "blank id {} collides with character id space 0..{}",
                blank_id,
                self.codec.vocab_size()
            )));
        }
        self.blank_id = blank_id;
        Ok(self)
    }

    pub fn with_collapse_repeated(mut self, collapse_repeated: bool) -> Self {
        self.collapse_repeated = collapse_repeated;
        self
    }

    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    /// Decode model output and the matching ground truth
    ///
    /// * `output` - frame scores, shape (batch, time, classes)
    /// * `labels` - padded label batch, shape (batch, max_label_len)
    /// * `label_lengths` - true length of each label row
    pub fn decode(
        &self,
        output: ArrayView3<'_, f32>,
        labels: ArrayView2<'_, i64>,
        label_lengths: &[usize],
    ) -> Result<DecodedBatch> {
        let batch = output.len_of(Axis(0));
        if labels.nrows() != batch || label_lengths.len() != batch {
            return Err(DataError::shape_mismatch(format!(
                "output batch {}, labels {}, label lengths {}",
                batch,
                labels.nrows(),
                label_lengths.len()
            )));
        }
        if output.len_of(Axis(2)) == 0 {
            return Err(DataError::shape_mismatch("output has no classes"));
        }

        let mut decoded = DecodedBatch::default();
        for (i, scores) in output.outer_iter().enumerate() {
            decoded.targets.push(self.decode_target(labels.row(i), label_lengths[i])?);

            let frames: Vec<usize> = scores.outer_iter().map(argmax).collect();
            decoded.predictions.push(self.decode_frames(&frames)?);
        }
        Ok(decoded)
    }

    /// Decode one sequence of per-frame arg-max ids
    pub fn decode_frames(&self, frames: &[usize]) -> Result<String> {
        self.codec.decode(&self.collapse(frames))
    }

    /// Blank removal and repeat collapse on per-frame ids
    ///
    /// A non-blank id is dropped when it equals the id of the frame right
    /// before it, so a blank between two equal ids keeps both.
    pub fn collapse(&self, frames: &[usize]) -> Vec<usize> {
        frames
            .iter()
            .enumerate()
            .filter(|&(j, &id)| {
                id != self.blank_id
                    && !(self.collapse_repeated && j != 0 && id == frames[j - 1])
            })
            .map(|(_, &id)| id)
            .collect()
    }

    fn decode_target(&self, row: ArrayView1<'_, i64>, len: usize) -> Result<String> {
        if len > row.len() {
            return Err(DataError::shape_mismatch(format!(
                "label length {} exceeds padded width {}",
                len,
                row.len()
            )));
        }
        let ids = row
            .iter()
            .take(len)
            .map(|&id| {
                usize::try_from(id)
                    .map_err(|_| DataError::shape_mismatch(format!("negative label id {}", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        self.codec.decode(&ids)
    }
}

impl Default for GreedyDecoder {
    fn default() -> Self {
        Self::new(TextCodec::new())
    }
}

/// Index of the first maximum
fn argmax(scores: ArrayView1<'_, f32>) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}
