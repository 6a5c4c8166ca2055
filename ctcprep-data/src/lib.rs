//! CTC training data pipeline
//!
//! Manifest rows go in, padded batches with their length vectors come out.
//! Model output goes back through [`GreedyDecoder`] for comparison with the
//! references.
//!
//! ## Architecture
//!
//! ```text
//! Manifest (key, text)
//!   │
//!   ├─> SampleSource::get(index)
//!   │     ├─> Waveform ──> FeatureExtractor ──> Augmenter (training)
//!   │     ├─> TextCodec::encode
//!   │     └─> invariants, neighbor retry
//!   │
//!   ├─> BatchLoader (parallel fetch) ──> BatchCollator ──> Batch
//!   │
//!   └─> model (external) ──> GreedyDecoder ──> (predictions, targets)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use ctcprep_data::{BatchCollator, DataConfig, SampleSource};
//!
//! let config = DataConfig::default();
//! let train = SampleSource::from_manifest_path("train.json", &config, false)?;
//!
//! let samples = (0..4).map(|i| train.get(i)).collect::<Result<Vec<_>, _>>()?;
//! let batch = BatchCollator::from_config(&config).collate_samples(samples)?;
//! println!("{:?} {:?}", batch.spectrograms.shape(), batch.input_lengths);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collate;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod text;

pub use collate::{Batch, BatchCollator};
pub use config::DataConfig;
pub use dataset::{Sample, SampleSource, TIME_DOWNSAMPLING};
pub use decoder::{DecodedBatch, GreedyDecoder};
pub use error::{DataError, Result, SampleRejection};
pub use loader::{plan_epoch, BatchLoader};
pub use manifest::{Manifest, ManifestSummary, Utterance};
pub use text::{TextCodec, BLANK_ID, NUM_CLASSES, SPACE_ID};
