//! Character vocabulary for CTC labels
//!
//! Ids 0..=27 cover the apostrophe, the word boundary and `a`..`z`. The CTC
//! blank sits just outside the map at [`BLANK_ID`].

use std::collections::HashMap;

use crate::error::{DataError, Result};

/// Id rendered as a space and produced for every boundary character
pub const SPACE_ID: usize = 1;

/// Reserved CTC blank, never produced by [`TextCodec::encode`]
pub const BLANK_ID: usize = 28;

/// Output classes of the model: every character plus the blank
pub const NUM_CLASSES: usize = BLANK_ID + 1;

/// Characters encoded as the word boundary
const BOUNDARY_CHARS: [char; 3] = [' ', '.', ','];

/// Bidirectional mapping between transcript characters and label ids
#[derive(Debug, Clone)]
pub struct TextCodec {
    /// Id to character mapping, the boundary is stored as ' '
    symbols: Vec<char>,
    /// Character to id mapping
    symbol_to_id: HashMap<char, usize>,
}

impl TextCodec {
    pub fn new() -> Self {
        let symbols: Vec<char> = ['\'', ' '].into_iter().chain('a'..='z').collect();
        let symbol_to_id = symbols
            .iter()
            .enumerate()
            .filter(|&(id, _)| id != SPACE_ID)
            .map(|(id, &ch)| (ch, id))
            .collect();

        Self {
            symbols,
            symbol_to_id,
        }
    }

    /// Encode a transcript to one label id per character
    ///
    /// Space, period and comma all become [`SPACE_ID`]. Anything outside the
    /// alphabet fails with [`DataError::UnknownCharacter`]; there is no case
    /// folding.
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars()
            .enumerate()
            .map(|(position, ch)| {
                self.id_of(ch)
                    .ok_or(DataError::UnknownCharacter { ch, position })
            })
            .collect()
    }

    /// Decode label ids back to text, boundary ids render as a space
    ///
    /// The blank id, or any id outside the map, is an error: callers strip
    /// blanks before decoding.
    pub fn decode(&self, labels: &[usize]) -> Result<String> {
        labels
            .iter()
            .map(|&id| self.symbols.get(id).copied().ok_or(DataError::InvalidLabelId(id)))
            .collect()
    }

    /// Get id for a single character
    pub fn id_of(&self, ch: char) -> Option<usize> {
        if BOUNDARY_CHARS.contains(&ch) {
            Some(SPACE_ID)
        } else {
            self.symbol_to_id.get(&ch).copied()
        }
    }

    /// Number of characters in the map (blank excluded)
    pub fn vocab_size(&self) -> usize {
        self.symbols.len()
    }

    pub fn blank_id(&self) -> usize {
        BLANK_ID
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new()
    }
}
