//! Error types for the retrieval engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for retrieval operations
pub type Result<T> = std::result::Result<T, Error>;

/// Retrieval engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (including invalid chunk parameters)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single document could not be read, decoded or chunked
    #[error("Failed to ingest '{path}': {message}")]
    Ingestion { path: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Embedding provider failure
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Corrupt, missing or mismatched index
    #[error("Index error: {0}")]
    Index(String),

    /// Malformed API request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Documents directory missing
    #[error("Documents directory not found: {0}")]
    DocumentsPathNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an ingestion error for a single file
    pub fn ingestion(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an index error
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Per-file errors that are collected into the ingest summary instead of
    /// aborting the batch
    pub fn is_ingestion(&self) -> bool {
        matches!(self, Self::Ingestion { .. } | Self::UnsupportedFileType(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Ingestion { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ingestion_error",
                self.to_string(),
            ),
            Error::UnsupportedFileType(ext) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_type",
                format!("Unsupported file type: {}", ext),
            ),
            Error::Embedding(msg) => (StatusCode::BAD_GATEWAY, "embedding_error", msg.clone()),
            Error::Index(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "index_error", msg.clone()),
            Error::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            Error::DocumentNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Document not found: {}", id),
            ),
            Error::DocumentsPathNotFound(path) => (
                StatusCode::NOT_FOUND,
                "documents_not_found",
                format!("Documents directory not found: {}", path),
            ),
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error", err.to_string()),
            Error::Sqlite(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                err.to_string(),
            ),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        if status.is_server_error() {
            tracing::error!("{} ({}): {}", error_type, status, message);
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
