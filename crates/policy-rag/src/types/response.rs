//! Response types returned by the engine and the HTTP API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{Chunk, Document, EntryMetadata, FileType};

/// Document a hit came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document ID
    pub id: Uuid,
    /// Source path
    pub path: String,
    /// Filename
    pub filename: String,
    /// File type
    pub file_type: FileType,
}

impl DocumentRef {
    /// Build from an entry's chunk and metadata
    pub fn from_entry(chunk: &Chunk, metadata: &EntryMetadata) -> Self {
        Self {
            id: chunk.document_id,
            path: metadata.path.clone(),
            filename: metadata.filename.clone(),
            file_type: metadata.file_type,
        }
    }
}

/// A single ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// 1-based rank
    pub rank: usize,
    /// Similarity under the index metric (higher is more similar)
    pub similarity: f32,
    /// The matched chunk
    pub chunk: Chunk,
    /// Source document
    pub document: DocumentRef,
}

/// Response of `POST /api/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query as received
    pub query: String,
    /// Ranked results
    pub results: Vec<SearchHit>,
    /// Number of results
    pub total_results: usize,
}

impl SearchResponse {
    /// Wrap ranked hits
    pub fn new(query: String, results: Vec<SearchHit>) -> Self {
        Self {
            query,
            total_results: results.len(),
            results,
        }
    }
}

/// A chunk that contributed to an assembled context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    /// 1-based rank of the chunk
    pub rank: usize,
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Document ID
    pub document_id: Uuid,
    /// Filename
    pub filename: String,
    /// Similarity score
    pub similarity: f32,
}

/// Response of `POST /api/context`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResponse {
    /// The query as received
    pub query: String,
    /// Concatenated chunk text
    pub context: String,
    /// Chunks included in `context`, in order
    pub sources: Vec<ContextSource>,
    /// Whether the budget cut the context short
    pub truncated: bool,
}

/// A file that could not be ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    /// Path that failed
    pub path: String,
    /// Error message
    pub error: String,
}

/// Result of an ingest call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    /// At least one document is indexed and nothing aborted the call
    pub success: bool,
    /// The index was discarded and rebuilt
    pub rebuilt: bool,
    /// Documents seen for the first time
    pub documents_added: usize,
    /// Documents whose content or chunking changed
    pub documents_updated: usize,
    /// Documents skipped as unchanged
    pub documents_unchanged: usize,
    /// Documents removed because their file disappeared
    pub documents_removed: usize,
    /// Chunks written by this call
    pub chunks_created: usize,
    /// Per-file failures (the batch continued past them)
    #[serde(default)]
    pub failed: Vec<IngestFailure>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Index statistics after the call
    pub stats: IndexStats,
}

/// Read-only index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Documents indexed
    pub documents: usize,
    /// Chunks indexed
    pub chunks: usize,
    /// Index entries (one per chunk)
    pub index_size: usize,
    /// Embedding dimension of the index
    pub embedding_dimension: usize,
    /// Embedding provider name
    pub embedding_provider: String,
    /// Embedding model
    pub embedding_model: String,
    /// Similarity metric
    pub similarity_metric: String,
    /// Size of the index database on disk
    pub storage_bytes: u64,
    /// Index directory
    pub vector_db_path: String,
    /// Documents directory
    pub documents_path: String,
    /// Default window size
    pub chunk_size: usize,
    /// Default window overlap
    pub chunk_overlap: usize,
}

/// Summary of an indexed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document ID
    pub id: Uuid,
    /// Source path
    pub path: String,
    /// Filename
    pub filename: String,
    /// File type
    pub file_type: FileType,
    /// Number of chunks created
    pub total_chunks: u32,
    /// File size in bytes
    pub file_size: u64,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            path: doc.path.clone(),
            filename: doc.filename.clone(),
            file_type: doc.file_type,
            total_chunks: doc.total_chunks,
            file_size: doc.file_size,
            ingested_at: doc.ingested_at,
        }
    }
}

/// Response for listing documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    /// List of documents
    pub documents: Vec<DocumentSummary>,
    /// Total count
    pub total_count: usize,
}
