
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tracing::debug;

use crate::config::ConfigError;

/// Default number of words per chunk
pub const DEFAULT_MAX_WORDS: usize = 500;

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum number of whitespace-delimited words per chunk
    pub max_words: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

/// Split text into consecutive, non-overlapping windows of at most `max_words` words.
///
/// Words are whitespace-delimited and each window is re-joined with single
/// spaces, so the word sequence of the input is preserved exactly. Windows
/// ignore sentence boundaries. Empty or whitespace-only input yields no chunks.
#[inline]
pub fn chunk_text(text: &str, max_words: usize) -> Result<Vec<String>, ConfigError> {
    let max_words =
        NonZeroUsize::new(max_words).ok_or(ConfigError::InvalidChunkWords(max_words))?;
    Ok(chunk_words(text, max_words))
}

/// [`chunk_text`] with an already validated window size
#[inline]
pub fn chunk_words(text: &str, max_words: NonZeroUsize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let chunks: Vec<String> = words
        .chunks(max_words.get())
        .map(|window| window.join(" "))
        .collect();

    debug!(
        "Chunked {} words into {} chunks (max {} words)",
        words.len(),
        chunks.len(),
        max_words
    );

    chunks
}

/// Count whitespace-delimited words
#[inline]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
