//! Token-window chunking with byte and token position tracking
//!
//! Tokens are Unicode word-boundary segments, so every byte of the text
//! belongs to exactly one token and the windows can be stitched back into
//! the original text.

use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::types::{Chunk, Document};

/// A window over the token sequence of a text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWindow {
    pub token_start: usize,
    pub token_end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Tokens shared with the previous window
    pub overlap_tokens: usize,
    /// Bytes shared with the previous window
    pub overlap_bytes: usize,
}

/// Splits text into fixed-size token windows with overlap
#[derive(Debug, Clone, Copy)]
pub struct TokenChunker {
    /// Window size in tokens
    chunk_size: usize,
    /// Tokens repeated at the start of the next window
    overlap: usize,
}

impl TokenChunker {
    /// Create a new chunker from validated parameters
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        }
    }

    /// Compute the windows covering `text`
    pub fn windows(&self, text: &str) -> Vec<TokenWindow> {
        // Byte offset where each token starts, plus the end of the text
        let mut bounds: Vec<usize> = text.split_word_bound_indices().map(|(i, _)| i).collect();
        let n_tokens = bounds.len();
        if n_tokens == 0 {
            return Vec::new();
        }
        bounds.push(text.len());

        let size = self.chunk_size.max(1);
        let overlap = self.overlap.min(size - 1);

        let mut windows = Vec::with_capacity(n_tokens / (size - overlap) + 1);
        let mut start = 0;
        let mut prev: Option<TokenWindow> = None;

        loop {
            let end = (start + size).min(n_tokens);
            let byte_start = bounds[start];
            let (overlap_tokens, overlap_bytes) = match prev {
                Some(p) => (p.token_end - start, p.byte_end - byte_start),
                None => (0, 0),
            };

            let window = TokenWindow {
                token_start: start,
                token_end: end,
                byte_start,
                byte_end: bounds[end],
                overlap_tokens,
                overlap_bytes,
            };
            windows.push(window);

            if end == n_tokens {
                break;
            }
            start = end - overlap;
            prev = Some(window);
        }

        windows
    }

    /// Chunk a document's extracted text
    pub fn chunk_document(&self, doc: &Document, text: &str) -> Vec<Chunk> {
        self.windows(text)
            .into_iter()
            .enumerate()
            .map(|(index, w)| Chunk {
                id: Uuid::new_v4(),
                document_id: doc.id,
                chunk_index: index as u32,
                text: text[w.byte_start..w.byte_end].to_string(),
                byte_start: w.byte_start,
                byte_end: w.byte_end,
                token_start: w.token_start,
                token_end: w.token_end,
                overlap_tokens: w.overlap_tokens,
                overlap_bytes: w.overlap_bytes,
            })
            .collect()
    }
}

/// Stitch chunks (in index order) back into the text they were cut from
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.push_str(chunk.fresh_text());
        }
    }
    text
}
