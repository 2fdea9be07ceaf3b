//! Document ingestion: text extraction, token-window chunking and directory
//! discovery

mod chunker;
mod parser;
mod processor;

pub use chunker::{reassemble, TokenChunker, TokenWindow};
pub use parser::{hash_content, FileParser, ParsedDocument};
pub use processor::{discover_documents, DocumentSource, IngestPipeline};
