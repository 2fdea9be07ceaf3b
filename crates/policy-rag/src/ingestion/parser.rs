//! Multi-format text extraction

use sha2::{Digest, Sha256};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::FileType;

/// Upper bound on a single PDF extraction
const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Extracted text of one source file
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File type
    pub file_type: FileType,
    /// Extracted text content
    pub content: String,
    /// SHA-256 of `content`, used for change detection
    pub content_hash: String,
    /// Size of the raw file in bytes
    pub file_size: u64,
}

/// Multi-format file parser
pub struct FileParser;

impl FileParser {
    /// Parse a file based on its extension. `path` is only used for type
    /// detection and error messages.
    pub fn parse(path: &str, data: &[u8]) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(std::path::Path::new(path));

        let content = match file_type {
            FileType::Txt | FileType::Markdown => decode_text(data),
            FileType::Html => Self::parse_html(path, data)?,
            FileType::Docx => Self::parse_docx(path, data)?,
            FileType::Pdf => Self::parse_pdf(path, data)?,
            FileType::Unknown => {
                let ext = std::path::Path::new(path)
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                return Err(Error::UnsupportedFileType(ext));
            }
        };

        if content.trim().is_empty() {
            return Err(Error::ingestion(path, "no text extracted"));
        }

        Ok(ParsedDocument {
            file_type,
            content_hash: hash_content(&content),
            content,
            file_size: data.len() as u64,
        })
    }

    /// Parse PDF document
    fn parse_pdf(path: &str, data: &[u8]) -> Result<String> {
        let text = extract_pdf_with_timeout(path, data)?;

        // Drop NULs and blank lines left by the extractor
        Ok(text
            .replace('\0', "")
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Parse DOCX document (paragraph text only)
    fn parse_docx(path: &str, data: &[u8]) -> Result<String> {
        let doc = docx_rs::read_docx(data).map_err(|e| Error::ingestion(path, e.to_string()))?;

        let mut content = String::new();
        for child in doc.document.children {
            if let docx_rs::DocumentChild::Paragraph(p) = child {
                for child in p.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let docx_rs::RunChild::Text(t) = child {
                                content.push_str(&t.text);
                            }
                        }
                    }
                }
                content.push('\n');
            }
        }

        Ok(content)
    }

    /// Parse HTML document (visible body text)
    fn parse_html(path: &str, data: &[u8]) -> Result<String> {
        let html = decode_text(data);
        let document = scraper::Html::parse_document(&html);
        let body_selector = scraper::Selector::parse("body")
            .map_err(|e| Error::ingestion(path, format!("selector error: {:?}", e)))?;

        let mut content = String::new();
        if let Some(body) = document.select(&body_selector).next() {
            for text in body.text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(trimmed);
                }
            }
        }

        Ok(content)
    }
}

/// UTF-8 with a Latin-1 fallback for legacy text files
fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(s) => s.trim_start_matches('\u{feff}').to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

/// pdf-extract can hang on some fonts and panic on malformed input, so it
/// runs on its own thread with a deadline
fn extract_pdf_with_timeout(path: &str, data: &[u8]) -> Result<String> {
    let data = data.to_vec();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data).map_err(|e| e.to_string());
        let _ = tx.send(result);
    });

    match rx.recv_timeout(PDF_EXTRACT_TIMEOUT) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(Error::ingestion(path, format!("corrupt PDF: {}", e))),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::error!("PDF extraction of {} timed out", path);
            Err(Error::ingestion(path, "PDF extraction timed out"))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::ingestion(path, "PDF extractor crashed"))
        }
    }
}

/// Hash content for change detection
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
