//! Dataset configuration
//!
//! Stored as TOML. Every field has a default, so a config file only needs
//! the values it overrides.

use ctcprep_audio::{AugmentConfig, AugmentPolicy, FeatureConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DataError, Result};

/// Feature, augmentation, validation and loading parameters for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Sample rate the feature extractor assumes (Hz)
    pub sample_rate: u32,

    /// Number of mel bins
    pub n_feats: usize,

    /// STFT window length in samples
    pub win_length: usize,

    /// STFT hop in samples
    pub hop_length: usize,

    /// Probability that a training sample gets masked
    pub specaug_rate: f32,

    /// Masking policy id: 1 = single pair, 2 = double pair, 3 = mixed
    pub specaug_policy: AugmentPolicy,

    /// Maximum time mask width (frames)
    pub time_mask: usize,

    /// Maximum frequency mask width (mel bins)
    pub freq_mask: usize,

    /// Spectrograms with more frames than this are rejected
    pub max_frames: usize,

    /// Fetch attempts per `get` before giving up
    pub max_retries: usize,

    /// Log every rejected or unreadable sample
    pub log_failures: bool,

    /// Resample audio whose native rate differs from `sample_rate`
    pub resample: bool,

    /// Encode every transcript when the dataset is built
    pub check_alphabet_on_load: bool,

    /// Value written into padded label positions
    ///
    /// The default 0 is also the apostrophe id, so padded positions only
    /// mean something through `label_lengths`. Set it to the blank id for
    /// a pad distinct from every label.
    pub label_pad: i64,

    /// Samples per batch
    pub batch_size: usize,

    /// Loader threads per batch, 0 fetches on the calling thread
    pub workers: usize,

    /// Shuffle sample order every epoch
    pub shuffle: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            n_feats: 81,
            win_length: 160,
            hop_length: 80,
            specaug_rate: 0.5,
            specaug_policy: AugmentPolicy::Mixed,
            time_mask: 100,
            freq_mask: 30,
            max_frames: 8000,
            max_retries: 64,
            log_failures: true,
            resample: false,
            check_alphabet_on_load: false,
            label_pad: 0,
            batch_size: 64,
            workers: 0,
            shuffle: true,
        }
    }
}

impl DataConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DataError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: DataConfig = toml::from_str(&contents)
            .map_err(|e| DataError::config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration as TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| DataError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `<config dir>/ctcprep/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ctcprep")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.specaug_rate) {
            return Err(DataError::config(format!(
                "specaug_rate {} outside 0.0..=1.0",
                self.specaug_rate
            )));
        }
        if self.max_retries == 0 {
            return Err(DataError::config("max_retries must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(DataError::config("batch_size must be at least 1"));
        }
        if self.hop_length == 0 || self.win_length == 0 || self.n_feats == 0 {
            return Err(DataError::config(
                "n_feats, win_length and hop_length must be positive",
            ));
        }
        Ok(())
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig::new(self.sample_rate, self.n_feats, self.win_length, self.hop_length)
    }

    pub fn augment_config(&self) -> AugmentConfig {
        AugmentConfig::new(
            self.specaug_rate,
            self.specaug_policy,
            self.freq_mask,
            self.time_mask,
        )
    }
}
