//! # Engine Configuration
//!
//! Immutable settings handed to a [`crate::QueryEngine`] at construction.
//! The core only defines the shape; reading files is the app layer's job.

use crate::confidence::WeightTable;
use crate::primitives::{
    DEFAULT_LIMIT, DEFAULT_TIMEOUT_MS, MAX_HOPS_LIMIT, MAX_LIMIT, MAX_TRAVERSAL_STATES,
    PLAN_CACHE_CAPACITY,
};
use crate::types::ProvGraphError;
use serde::{Deserialize, Serialize};

/// Resource limits applied to every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub max_hops_limit: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub max_traversal_states: usize,
    pub plan_cache_capacity: usize,
    /// Per-query deadline; `None` disables it.
    pub timeout_ms: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_hops_limit: MAX_HOPS_LIMIT,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            max_traversal_states: MAX_TRAVERSAL_STATES,
            plan_cache_capacity: PLAN_CACHE_CAPACITY,
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub weights: WeightTable,
    pub limits: Limits,
}

impl EngineConfig {
    /// Reject configurations that would make queries unbounded or scoring undefined.
    pub fn validate(&self) -> Result<(), ProvGraphError> {
        self.weights.validate()?;
        let limits = &self.limits;
        if limits.max_hops_limit == 0 {
            return Err(ProvGraphError::Config(
                "max_hops_limit must be at least 1".to_string(),
            ));
        }
        if limits.default_limit == 0 || limits.default_limit > limits.max_limit {
            return Err(ProvGraphError::Config(format!(
                "default_limit must be in 1..={}",
                limits.max_limit
            )));
        }
        if limits.max_traversal_states == 0 {
            return Err(ProvGraphError::Config(
                "max_traversal_states must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
