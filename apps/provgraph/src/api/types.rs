//! # API Request/Response Types
//!
//! JSON bodies of the non-query endpoints and the error response.
//! Query results use `provgraph_core::QueryResult` as-is.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use provgraph_core::{ErrorBody, ExecutionFault, ProvGraphError};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub entity_count: usize,
    pub edge_count: usize,
    pub backend: String,
    pub cached_plans: usize,
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// An engine error rendered as `{"error": {code, message, details}}`.
#[derive(Debug)]
pub struct ApiError(pub ProvGraphError);

impl ApiError {
    /// HTTP status for an engine error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ProvGraphError::Validation { .. } => StatusCode::BAD_REQUEST,
            ProvGraphError::UnsupportedFeature(_) => StatusCode::NOT_IMPLEMENTED,
            ProvGraphError::Execution(ExecutionFault::Timeout | ExecutionFault::Cancelled) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ProvGraphError::Execution(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProvGraphError::DataIntegrity(_)
            | ProvGraphError::Config(_)
            | ProvGraphError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProvGraphError> for ApiError {
    fn from(err: ProvGraphError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_error_class() {
        let cases = [
            (ProvGraphError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                ProvGraphError::UnsupportedFeature("subgraph".to_string()),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (ExecutionFault::Timeout.into(), StatusCode::GATEWAY_TIMEOUT),
            (ExecutionFault::Cancelled.into(), StatusCode::GATEWAY_TIMEOUT),
            (
                ExecutionFault::BudgetExhausted(10).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ProvGraphError::store("disk gone"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ProvGraphError::DataIntegrity("claim without evidence".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn health_reports_crate_version() {
        let health = HealthResponse::default();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}
