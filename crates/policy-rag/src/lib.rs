//! policy-rag: retrieval over a corpus of policy documents
//!
//! Documents (txt, md, html, docx, pdf) are split into overlapping token
//! windows, embedded through an [`EmbeddingProvider`](providers::EmbeddingProvider)
//! and stored in a persistent SQLite-backed similarity index. The
//! [`RetrievalEngine`] answers top-k searches and assembles bounded context
//! strings; the [`server`] module exposes it over HTTP.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use retrieval::RetrievalEngine;
pub use types::{
    Chunk, ContextResponse, Document, FileType, IndexStats, IngestOptions, IngestSummary,
    SearchHit,
};
