//! Ingestion pipeline orchestration

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document, FileType};

use super::chunker::TokenChunker;
use super::parser::{FileParser, ParsedDocument};

/// A document to ingest: a path on disk, or a path with its bytes already
/// in memory
#[derive(Debug, Clone)]
pub struct DocumentSource {
    /// Source path; the key used for incremental ingestion
    pub path: String,
    /// Raw bytes, read from `path` when absent
    pub data: Option<Vec<u8>>,
}

impl DocumentSource {
    /// A file to be read from disk
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().to_string(),
            data: None,
        }
    }

    /// In-memory content under the given path
    pub fn from_bytes(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: Some(data.into()),
        }
    }

    /// Raw bytes of the source. An unreadable file is a per-file ingestion
    /// error.
    pub fn load(&self) -> Result<Cow<'_, [u8]>> {
        match &self.data {
            Some(data) => Ok(Cow::Borrowed(data.as_slice())),
            None => std::fs::read(&self.path)
                .map(Cow::Owned)
                .map_err(|e| Error::ingestion(&self.path, e.to_string())),
        }
    }
}

/// Parse + chunk, for one set of chunk parameters
pub struct IngestPipeline {
    chunking: ChunkingConfig,
    chunker: TokenChunker,
}

impl IngestPipeline {
    /// Create a new ingestion pipeline
    pub fn new(chunking: ChunkingConfig) -> Self {
        Self {
            chunking,
            chunker: TokenChunker::new(chunking),
        }
    }

    /// Chunk parameters of this pipeline
    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    /// Read and extract the text of a source
    pub fn parse(&self, source: &DocumentSource) -> Result<ParsedDocument> {
        let data = source.load()?;
        FileParser::parse(&source.path, &data)
    }

    /// Create the document record and its chunks from extracted text
    pub fn create_chunks(&self, path: &str, parsed: &ParsedDocument) -> (Document, Vec<Chunk>) {
        let mut doc = Document::new(
            path,
            parsed.file_type,
            parsed.content_hash.clone(),
            parsed.file_size,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        );

        let chunks = self.chunker.chunk_document(&doc, &parsed.content);
        doc.total_chunks = chunks.len() as u32;
        (doc, chunks)
    }

    /// Full ingestion of one source: parse + chunk
    pub fn ingest(&self, source: &DocumentSource) -> Result<(Document, Vec<Chunk>)> {
        let parsed = self.parse(source)?;
        Ok(self.create_chunks(&source.path, &parsed))
    }
}

/// Recursively find files with a supported extension under `root`, sorted
/// by path
pub fn discover_documents(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::DocumentsPathNotFound(root.display().to_string()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable directory entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| FileType::from_path(path).is_supported())
        .collect();

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_ingest_from_bytes() {
        let pipeline = IngestPipeline::new(ChunkingConfig::new(4, 1).unwrap());
        let source = DocumentSource::from_bytes("hr/leave.txt", "Employees get 15 vacation days.");
        let (doc, chunks) = pipeline.ingest(&source).unwrap();

        assert_eq!(doc.filename, "leave.txt");
        assert_eq!(doc.chunk_size, 4);
        assert_eq!(doc.total_chunks as usize, chunks.len());
        assert!(chunks.iter().all(|c| c.document_id == doc.id));
    }

    #[test]
    fn test_missing_file_is_ingestion_error() {
        let pipeline = IngestPipeline::new(ChunkingConfig::default());
        let err = pipeline
            .ingest(&DocumentSource::from_path("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(err.is_ingestion());
    }

    #[test]
    fn test_discover_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hr/benefits")).unwrap();
        std::fs::write(dir.path().join("hr/leave.md"), "leave").unwrap();
        std::fs::write(dir.path().join("hr/benefits/health.html"), "<p>x</p>").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join("code.txt"), "conduct").unwrap();

        let files = discover_documents(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["code.txt", "hr/benefits/health.html", "hr/leave.md"]);
    }

    #[test]
    fn test_discover_missing_root() {
        let err = discover_documents(Path::new("/no/such/policies")).unwrap_err();
        assert!(matches!(err, Error::DocumentsPathNotFound(_)));
    }
}
