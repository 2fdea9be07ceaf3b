//! Embedding providers
//!
//! The remote embedder sits behind [`EmbeddingProvider`] so the engine can be
//! driven by the deterministic mock in tests and when no API key is set.

pub mod embedding;
pub mod mock;
pub mod openai;

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use mock::MockEmbedder;
pub use openai::OpenAiEmbedder;

/// Build the embedder selected by configuration
pub fn build_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.use_mock_embeddings() {
        tracing::info!(
            "Using mock embeddings ({} dimensions); set OPENAI_API_KEY for real embeddings",
            config.embeddings.dimensions
        );
        Ok(Arc::new(MockEmbedder::new(config.embeddings.dimensions)))
    } else {
        tracing::info!(
            "Using OpenAI embeddings: model={}, base_url={}",
            config.embeddings.model,
            config.embeddings.base_url
        );
        Ok(Arc::new(OpenAiEmbedder::new(&config.embeddings)?))
    }
}
