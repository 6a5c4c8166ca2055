//! Batched, parallel sample loading
//!
//! Samples of one batch are fetched on scoped worker threads. Collation
//! starts only after every fetch of the batch has returned.

use ctcprep_audio::WaveformLoader;
use rand::seq::SliceRandom;
use rand::Rng;
use std::thread;
use tracing::debug;

use crate::collate::{Batch, BatchCollator};
use crate::config::DataConfig;
use crate::dataset::{Sample, SampleSource};
use crate::error::Result;

/// Split `0..len` into batches of `batch_size`, optionally shuffled first
///
/// The last batch may be short.
pub fn plan_epoch<R: Rng + ?Sized>(
    len: usize,
    batch_size: usize,
    shuffle: bool,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        order.shuffle(rng);
    }
    order
        .chunks(batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}

/// Turns a [`SampleSource`] into padded batches
pub struct BatchLoader<'a, L: WaveformLoader> {
    source: &'a SampleSource<L>,
    collator: BatchCollator,
    batch_size: usize,
    workers: usize,
    shuffle: bool,
}

impl<'a, L: WaveformLoader> BatchLoader<'a, L> {
    pub fn new(source: &'a SampleSource<L>, collator: BatchCollator, batch_size: usize) -> Self {
        Self {
            source,
            collator,
            batch_size: batch_size.max(1),
            workers: 0,
            shuffle: false,
        }
    }

    pub fn from_config(source: &'a SampleSource<L>, config: &DataConfig) -> Self {
        Self::new(source, BatchCollator::from_config(config), config.batch_size)
            .workers(config.workers)
            .shuffle(config.shuffle)
    }

    /// Worker threads per batch, 0 loads on the calling thread
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Number of batches in one pass over the source
    pub fn num_batches(&self) -> usize {
        self.source.len().div_ceil(self.batch_size)
    }

    /// Fetch and collate the samples at `indices`
    pub fn load(&self, indices: &[usize]) -> Result<Batch> {
        let samples = if self.workers <= 1 || indices.len() <= 1 {
            indices
                .iter()
                .map(|&i| self.source.get(i))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.fetch_parallel(indices)?
        };

        debug!("Collating batch of {} samples", samples.len());
        self.collator.collate_samples(samples)
    }

    /// One pass over the source, batches produced lazily
    pub fn epoch<R: Rng + ?Sized>(&self, rng: &mut R) -> impl Iterator<Item = Result<Batch>> + '_ {
        plan_epoch(self.source.len(), self.batch_size, self.shuffle, rng)
            .into_iter()
            .map(move |indices| self.load(&indices))
    }

    fn fetch_parallel(&self, indices: &[usize]) -> Result<Vec<Sample>> {
        let chunk_size = indices.len().div_ceil(self.workers);
        let source = self.source;

        let per_worker: Vec<Result<Vec<Sample>>> = thread::scope(|scope| {
            let handles: Vec<_> = indices
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|&i| source.get(i))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        let mut samples = Vec::with_capacity(indices.len());
        for chunk in per_worker {
            samples.extend(chunk?);
        }
        Ok(samples)
    }
}
