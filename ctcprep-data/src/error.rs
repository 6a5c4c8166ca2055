//! Error types for dataset, collation and decoding

use ctcprep_audio::AudioError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

/// Why a loaded sample cannot be used for CTC training
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleRejection {
    /// More than one audio channel
    MultiChannel(usize),
    /// Fewer output frames than labels, CTC cannot align
    SpectrogramTooShort { spec_len: usize, label_len: usize },
    /// Utterance longer than the frame ceiling
    TooManyFrames { frames: usize, max_frames: usize },
    /// Transcript encoded to nothing
    EmptyLabel,
}

impl fmt::Display for SampleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiChannel(channels) => write!(f, "{} channels, expected 1", channels),
            Self::SpectrogramTooShort { spec_len, label_len } => write!(
                f,
                "spectrogram length {} shorter than label length {}",
                spec_len, label_len
            ),
            Self::TooManyFrames { frames, max_frames } => {
                write!(f, "{} frames exceeds limit of {}", frames, max_frames)
            }
            Self::EmptyLabel => write!(f, "label is empty"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Sample {index} rejected: {reason}")]
    Rejected {
        index: usize,
        reason: SampleRejection,
    },

    #[error("Unknown character {ch:?} at position {position}")]
    UnknownCharacter { ch: char, position: usize },

    #[error("Label id {0} has no character")]
    InvalidLabelId(usize),

    #[error("No valid sample found starting from index {index} after {attempts} attempt(s)")]
    Exhausted { index: usize, attempts: usize },

    #[error("Index {index} out of range for dataset of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Cannot collate an empty batch")]
    EmptyBatch,

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    pub fn manifest<S: Into<String>>(msg: S) -> Self {
        Self::Manifest(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn shape_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Load failures and invariant violations are retried at a neighboring
    /// index; everything else is surfaced immediately.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Audio(_) | Self::Rejected { .. } | Self::Io(_))
    }
}
