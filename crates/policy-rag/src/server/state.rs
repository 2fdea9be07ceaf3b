//! Application state for the HTTP server

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::providers::{build_embedder, EmbeddingProvider};
use crate::retrieval::RetrievalEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// The retrieval engine (owns the index)
    engine: Arc<RetrievalEngine>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Build the configured embedder and open the engine
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");
        let embedder = build_embedder(&config)?;
        Self::with_embedder(config, embedder).await
    }

    /// Open the engine with an explicit embedder
    pub async fn with_embedder(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let engine = RetrievalEngine::open(config, embedder).await?;
        Ok(Self::from_engine(Arc::new(engine)))
    }

    /// Wrap an already opened engine
    pub fn from_engine(engine: Arc<RetrievalEngine>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                ready: RwLock::new(true),
            }),
        }
    }

    /// Get the retrieval engine
    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.inner.engine
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        self.inner.engine.config()
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
