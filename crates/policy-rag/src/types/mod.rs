//! Core types for the retrieval engine

pub mod document;
pub mod request;
pub mod response;

pub use document::{Chunk, Document, EntryMetadata, FileType, IndexEntry};
pub use request::{ContextRequest, IngestOptions, IngestRequest, SearchRequest};
pub use response::{
    ContextResponse, ContextSource, DocumentListResponse, DocumentRef, DocumentSummary,
    IndexStats, IngestFailure, IngestSummary, SearchHit, SearchResponse,
};
