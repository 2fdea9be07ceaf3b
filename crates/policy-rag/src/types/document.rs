//! Document, chunk and index entry types

use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// HTML document
    Html,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a path's extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Stable lowercase name, used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Unknown => "unknown",
        }
    }

    /// Inverse of [`FileType::as_str`]
    pub fn parse_name(name: &str) -> Self {
        match name {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" => Self::Txt,
            "markdown" => Self::Markdown,
            "html" => Self::Html,
            _ => Self::Unknown,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
            Self::Unknown => "Unknown",
        }
    }
}

/// A document that has been indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID (new for every ingested version)
    pub id: Uuid,
    /// Source path; the key used for incremental ingestion
    pub path: String,
    /// File name shown in results
    pub filename: String,
    /// File type
    pub file_type: FileType,
    /// SHA-256 of the extracted text
    pub content_hash: String,
    /// File size in bytes
    pub file_size: u64,
    /// Number of chunks (and index entries) for this document
    pub total_chunks: u32,
    /// Window size used when chunking
    pub chunk_size: usize,
    /// Window overlap used when chunking
    pub chunk_overlap: usize,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a new document record
    pub fn new(
        path: impl Into<String>,
        file_type: FileType,
        content_hash: String,
        file_size: u64,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        let path = path.into();
        let filename = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());

        Self {
            id: Uuid::new_v4(),
            path,
            filename,
            file_type,
            content_hash,
            file_size,
            total_chunks: 0,
            chunk_size,
            chunk_overlap,
            ingested_at: chrono::Utc::now(),
        }
    }

    /// Same content and same chunk parameters: nothing to re-index
    pub fn is_unchanged(&self, content_hash: &str, chunk_size: usize, chunk_overlap: usize) -> bool {
        self.content_hash == content_hash
            && self.chunk_size == chunk_size
            && self.chunk_overlap == chunk_overlap
    }
}

/// A contiguous token window of a document's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Chunk index within document
    pub chunk_index: u32,
    /// Exact slice of the document text
    pub text: String,
    /// Byte range in the document text
    pub byte_start: usize,
    pub byte_end: usize,
    /// Token range in the document text
    pub token_start: usize,
    pub token_end: usize,
    /// Tokens shared with the previous chunk
    pub overlap_tokens: usize,
    /// Bytes shared with the previous chunk
    pub overlap_bytes: usize,
}

impl Chunk {
    /// Number of tokens in this chunk
    pub fn token_count(&self) -> usize {
        self.token_end - self.token_start
    }

    /// Text not already covered by the previous chunk
    pub fn fresh_text(&self) -> &str {
        self.text.get(self.overlap_bytes..).unwrap_or("")
    }
}

/// Source metadata stored next to every entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Source path of the document
    pub path: String,
    /// File name of the document
    pub filename: String,
    /// File type of the document
    pub file_type: FileType,
}

impl EntryMetadata {
    /// Metadata for entries of the given document
    pub fn for_document(doc: &Document) -> Self {
        Self {
            path: doc.path.clone(),
            filename: doc.filename.clone(),
            file_type: doc.file_type,
        }
    }
}

/// Immutable (chunk, embedding, metadata) triple held by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Insertion sequence number; breaks similarity ties
    pub seq: i64,
    /// The indexed chunk
    pub chunk: Chunk,
    /// Chunk embedding
    pub embedding: Vec<f32>,
    /// Source metadata
    pub metadata: EntryMetadata,
}
