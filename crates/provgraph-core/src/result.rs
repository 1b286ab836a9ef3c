//! # Result Shapes
//!
//! Wire forms of a successful query and of a failure.
//!
//! ```json
//! {"results": [...], "metadata": {"total_results": 2, "query_time_ms": 1, "has_more": false}}
//! {"error": {"code": "VALIDATION_ERROR", "message": "...", "details": {...}}}
//! ```

use crate::types::ProvGraphError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One projected row, keyed by the requested field paths in request order.
pub type ResultRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Rows matched before `offset`/`limit`.
    pub total_results: usize,
    pub query_time_ms: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub results: Vec<ResultRow>,
    pub metadata: ResultMetadata,
}

impl QueryResult {
    pub(crate) fn page(results: Vec<ResultRow>, total: usize, offset: usize) -> Self {
        let has_more = offset.saturating_add(results.len()) < total;
        Self {
            results,
            metadata: ResultMetadata {
                total_results: total,
                query_time_ms: 0,
                has_more,
            },
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Values of one column, in row order.
    #[must_use]
    pub fn column(&self, field: &str) -> Vec<&Value> {
        self.results.iter().filter_map(|row| row.get(field)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl From<&ProvGraphError> for ErrorBody {
    fn from(err: &ProvGraphError) -> Self {
        let details = match err {
            ProvGraphError::Validation { field, allowed, .. } => {
                if field.is_none() && allowed.is_empty() {
                    None
                } else {
                    Some(json!({ "field": field, "allowed_fields": allowed }))
                }
            }
            ProvGraphError::Execution(fault) => Some(json!({ "reason": fault.reason() })),
            _ => None,
        };
        let message = match err {
            ProvGraphError::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            error: ErrorDetail {
                code: err.code().to_string(),
                message,
                details,
            },
        }
    }
}
