//! API routes for the RAG server

pub mod documents;
pub mod ingest;
pub mod search;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Retrieval
        .route("/search", post(search::search))
        .route("/context", post(search::context))
        // Index maintenance
        .route("/ingest", post(ingest::ingest))
        .route("/stats", get(ingest::stats))
        .route("/clear", post(ingest::clear))
        // Document management
        .route("/documents", get(documents::list_documents))
        .route("/documents/:id", delete(documents::delete_document))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "policy-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Retrieval over policy documents with token-window chunking and a persistent similarity index",
        "endpoints": {
            "POST /api/search": "Top-k chunks for a query",
            "POST /api/context": "Concatenated context for a query",
            "POST /api/ingest": "Ingest the documents directory",
            "GET /api/stats": "Index statistics",
            "POST /api/clear": "Remove every document",
            "GET /api/documents": "List all documents",
            "DELETE /api/documents/:id": "Delete a document"
        }
    }))
}
