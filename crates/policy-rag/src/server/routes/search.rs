//! Search and context endpoints

use axum::{extract::State, Json};

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{ContextRequest, ContextResponse, SearchRequest, SearchResponse};

/// Reject blank queries and out-of-range `k`, resolving the default
fn validate(query: &str, k: Option<usize>, default_k: usize, limits: &RetrievalConfig) -> Result<usize> {
    if query.trim().is_empty() {
        return Err(Error::invalid_request("Query cannot be empty"));
    }

    let k = k.unwrap_or(default_k);
    if k == 0 || k > limits.max_k {
        return Err(Error::invalid_request(format!(
            "k must be between 1 and {}, got {}",
            limits.max_k, k
        )));
    }
    Ok(k)
}

/// POST /api/search - Ranked chunks for a query
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let limits = &state.config().retrieval;
    let k = validate(&request.query, request.k, limits.default_k, limits)?;
    if !request.min_similarity.is_finite() {
        return Err(Error::invalid_request("min_similarity must be a finite number"));
    }

    tracing::info!("Search: \"{}\" (k={})", request.query, k);

    let hits = state
        .engine()
        .search(&request.query, k, request.min_similarity)
        .await?;

    Ok(Json(SearchResponse::new(request.query, hits)))
}

/// POST /api/context - Bounded context string for a query
pub async fn context(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>> {
    let limits = &state.config().retrieval;
    let k = validate(&request.query, request.k, limits.context_k, limits)?;

    tracing::info!("Context: \"{}\" (k={})", request.query, k);

    let response = state.engine().get_context(&request.query, k).await?;
    Ok(Json(response))
}
