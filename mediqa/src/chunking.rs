//! Fixed-size document splitting with overlap.
//!
//! Source documents are split into word windows of `max_words` with
//! `overlap_words` shared between consecutive windows. Word boundaries come
//! from Unicode segmentation; chunk content is the original text slice, so
//! punctuation and inner whitespace survive intact.

use unicode_segmentation::UnicodeSegmentation;

use crate::types::RagError;

/// Window sizing for [`chunk_document`].
#[derive(Clone, Debug)]
pub struct ChunkingConfig {
    /// Maximum words per chunk.
    pub max_words: usize,
    /// Words shared between consecutive chunks.
    pub overlap_words: usize,
    /// Tail chunks shorter than this are dropped (the first chunk is always
    /// kept so short documents still index).
    pub min_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: 120,
            overlap_words: 20,
            min_words: 5,
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_words: usize, overlap_words: usize) -> Self {
        Self {
            max_words,
            overlap_words,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_min_words(mut self, min_words: usize) -> Self {
        self.min_words = min_words;
        self
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.max_words == 0 {
            return Err(RagError::Chunking("max_words must be greater than zero".into()));
        }
        if self.overlap_words >= self.max_words {
            return Err(RagError::Chunking(format!(
                "overlap_words ({}) must be smaller than max_words ({})",
                self.overlap_words, self.max_words
            )));
        }
        if self.min_words > self.max_words {
            return Err(RagError::Chunking(format!(
                "min_words ({}) must not exceed max_words ({})",
                self.min_words, self.max_words
            )));
        }
        Ok(())
    }
}

/// One window of a source document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// Zero-based position of this chunk within its document.
    pub chunk_index: usize,
    /// Word offset of the chunk start within the document.
    pub word_start: usize,
    pub word_count: usize,
}

/// Splits `text` into overlapping word windows.
///
/// Whitespace-only input produces no chunks. A document shorter than
/// `max_words` produces exactly one chunk covering the whole text.
pub fn chunk_document(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, RagError> {
    config.validate()?;

    let words: Vec<(usize, &str)> = text.unicode_word_indices().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.max_words - config.overlap_words;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + config.max_words).min(words.len());
        let word_count = end - start;
        let is_tail = end == words.len();

        if word_count >= config.min_words || chunks.is_empty() {
            let byte_start = words[start].0;
            // Extend to the next word start (or end of text) so trailing
            // punctuation stays with its sentence.
            let byte_end = if is_tail { text.len() } else { words[end].0 };
            chunks.push(TextChunk {
                content: text[byte_start..byte_end].trim_end().to_string(),
                chunk_index: chunks.len(),
                word_start: start,
                word_count,
            });
        }

        if is_tail {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
