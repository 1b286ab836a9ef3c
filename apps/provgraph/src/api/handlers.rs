//! # API Endpoint Handlers
//!
//! Queries run on tokio's blocking pool: the engine is synchronous and a
//! redb snapshot must not pin an async worker. The configured deadline
//! bounds how long a worker stays busy.

use super::{
    AppState,
    types::{ApiError, HealthResponse, StatusResponse},
};
use axum::{Json, body::Bytes, extract::State, response::IntoResponse};
use provgraph_core::{ProvGraphError, Query, QueryResult};

// =============================================================================
// HELPERS
// =============================================================================

/// Run engine work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ProvGraphError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProvGraphError::Io(format!("Query worker failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Parse a request body into a validated query.
fn parse_body(body: &[u8]) -> Result<Query, ProvGraphError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ProvGraphError::validation(format!("Malformed query JSON: {}", e)))?;
    Query::from_json(&value)
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Entity and edge counts of the current snapshot.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let engine = state.engine.clone();
    let response = run_blocking(move || {
        let stats = engine.stats()?;
        Ok(StatusResponse {
            entity_count: stats.entities,
            edge_count: stats.edges,
            backend: engine.store().label().to_string(),
            cached_plans: engine.cached_plans(),
        })
    })
    .await?;
    Ok(Json(response))
}

// =============================================================================
// SCHEMA HANDLER
// =============================================================================

/// Fields, operators and vocabularies the query language accepts.
pub async fn schema_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.schema().describe())
}

// =============================================================================
// QUERY HANDLERS
// =============================================================================

/// Execute a query.
pub async fn query_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueryResult>, ApiError> {
    let query = parse_body(&body)?;
    let engine = state.engine.clone();
    let result = run_blocking(move || engine.execute(&query)).await?;
    tracing::debug!(
        rows = result.len(),
        total = result.metadata.total_results,
        ms = result.metadata.query_time_ms,
        "query served"
    );
    Ok(Json(result))
}

/// Compiled plan summary; the store is not read.
pub async fn explain_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = parse_body(&body)?;
    Ok(Json(state.engine.explain(&query)?))
}
