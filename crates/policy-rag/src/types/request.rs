//! Request and option types

use serde::{Deserialize, Serialize};

use crate::config::ChunkingConfig;
use crate::error::Result;

/// Search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,
    /// Number of results (default from config)
    #[serde(default)]
    pub k: Option<usize>,
    /// Similarity floor (default 0.0)
    #[serde(default)]
    pub min_similarity: f32,
}

impl SearchRequest {
    /// Create a new search request
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
            min_similarity: 0.0,
        }
    }

    /// Set the number of results to retrieve
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Set the similarity threshold
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

/// Context request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    /// Free-text query
    pub query: String,
    /// Number of chunks to assemble (default from config)
    #[serde(default)]
    pub k: Option<usize>,
}

/// Ingest request body of `POST /api/ingest`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Discard the whole index and rebuild it
    #[serde(default)]
    pub force_rebuild: bool,
    /// Custom chunk size (overrides config)
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Custom chunk overlap (overrides config)
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
}

impl IngestRequest {
    /// Resolve into engine options against the configured defaults
    pub fn to_options(&self, defaults: &ChunkingConfig) -> Result<IngestOptions> {
        let chunking = ChunkingConfig::new(
            self.chunk_size.unwrap_or(defaults.chunk_size),
            self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
        )?;

        Ok(IngestOptions {
            chunking,
            force_rebuild: self.force_rebuild,
        })
    }
}

/// Options for a single ingest call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Window size and overlap
    pub chunking: ChunkingConfig,
    /// Discard the whole index and rebuild it
    pub force_rebuild: bool,
}

impl IngestOptions {
    /// Incremental ingest with the given chunking
    pub fn new(chunking: ChunkingConfig) -> Self {
        Self {
            chunking,
            force_rebuild: false,
        }
    }

    /// Request a full rebuild
    pub fn rebuild(mut self) -> Self {
        self.force_rebuild = true;
        self
    }
}
