//! Dataset manifests
//!
//! A manifest is either a JSON array of `{"key": <audio path>, "text":
//! <transcript>}` records or the same records as JSON Lines. Rows are not
//! validated here; bad audio or transcripts surface when a sample is fetched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DataError, Result};

/// One manifest row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Audio file path
    pub key: PathBuf,
    /// Transcript
    pub text: String,
}

impl Utterance {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(key: P, text: S) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// Ordered, immutable list of utterances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<Utterance>,
}

impl Manifest {
    pub fn new(entries: Vec<Utterance>) -> Self {
        Self { entries }
    }

    /// Load a manifest file (JSON array or JSON Lines)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading manifest from {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|e| {
            DataError::manifest(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let manifest = Self::parse(&contents)?;

        info!("Loaded {} manifest entries", manifest.len());
        Ok(manifest)
    }

    /// Parse manifest text, detecting the array or line-delimited layout
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim_start().starts_with('[') {
            let entries: Vec<Utterance> = serde_json::from_str(contents)
                .map_err(|e| DataError::manifest(format!("Invalid manifest JSON: {}", e)))?;
            return Ok(Self::new(entries));
        }

        let entries = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| {
                serde_json::from_str::<Utterance>(line).map_err(|e| {
                    DataError::manifest(format!("Invalid manifest line {}: {}", line_no + 1, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Utterance> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.entries.iter()
    }

    /// Summary statistics over transcript lengths
    pub fn describe(&self) -> ManifestSummary {
        let lengths: Vec<usize> = self.entries.iter().map(|u| u.text.chars().count()).collect();
        let total: usize = lengths.iter().sum();

        ManifestSummary {
            entries: lengths.len(),
            min_text_len: lengths.iter().copied().min().unwrap_or(0),
            max_text_len: lengths.iter().copied().max().unwrap_or(0),
            mean_text_len: if lengths.is_empty() {
                0.0
            } else {
                total as f64 / lengths.len() as f64
            },
        }
    }
}

/// Output of [`Manifest::describe`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestSummary {
    pub entries: usize,
    pub min_text_len: usize,
    pub max_text_len: usize,
    pub mean_text_len: f64,
}

impl fmt::Display for ManifestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entries:        {}", self.entries)?;
        writeln!(f, "text len min:   {}", self.min_text_len)?;
        writeln!(f, "text len mean:  {:.2}", self.mean_text_len)?;
        write!(f, "text len max:   {}", self.max_text_len)
    }
}
