//! Ingestion and index maintenance endpoints

use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{IndexStats, IngestRequest, IngestSummary};

/// An empty body means defaults; anything else must be a valid request
fn parse_request(body: &[u8]) -> Result<IngestRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(IngestRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| Error::invalid_request(format!("Invalid ingest request: {}", e)))
}

/// POST /api/ingest - Ingest the configured documents directory
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<Json<IngestSummary>> {
    let request = parse_request(&body)?;
    let config = state.config();
    let options = request.to_options(&config.chunking)?;

    tracing::info!(
        "Ingesting {} (force_rebuild={}, chunk_size={}, chunk_overlap={})",
        config.documents.path.display(),
        options.force_rebuild,
        options.chunking.chunk_size,
        options.chunking.chunk_overlap
    );

    let summary = state
        .engine()
        .ingest_directory(&config.documents.path, options)
        .await?;

    Ok(Json(summary))
}

/// GET /api/stats - Index statistics
pub async fn stats(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.engine().stats())
}

/// POST /api/clear - Remove every document from the index
pub async fn clear(State(state): State<AppState>) -> Result<Json<Value>> {
    state.engine().clear().await?;
    Ok(Json(json!({ "message": "Index cleared" })))
}
