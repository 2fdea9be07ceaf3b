//! Document management endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{DocumentListResponse, DocumentSummary};

/// GET /api/documents - List indexed documents
pub async fn list_documents(State(state): State<AppState>) -> Json<DocumentListResponse> {
    let documents = state.engine().list_documents();
    let total_count = documents.len();

    Json(DocumentListResponse {
        documents,
        total_count,
    })
}

/// DELETE /api/documents/:id - Delete a document and its chunks
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentSummary>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| Error::invalid_request(format!("Invalid document ID: {}", id)))?;

    let document = state.engine().delete_document(id).await?;
    Ok(Json(document))
}
