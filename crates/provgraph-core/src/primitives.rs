//! # Engine Primitives
//!
//! Hardcoded defaults and hard limits for query execution.
//!
//! Every query must be computationally bounded. The values here are the
//! defaults behind [`crate::config::Limits`]; deployments may tighten them.

/// Default `max_hops` for a path pattern.
pub const DEFAULT_MAX_HOPS: usize = 3;

/// Largest `max_hops` a query may request.
pub const MAX_HOPS_LIMIT: usize = 10;

/// Maximum number of path states a single traversal may allocate.
///
/// The frontier arena grows by one state per expansion; beyond this the
/// query fails with `BudgetExhausted` rather than exhausting memory.
pub const MAX_TRAVERSAL_STATES: usize = 1_000_000;

/// Rows returned when a query omits `limit`.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest `limit` a query may request.
pub const MAX_LIMIT: usize = 10_000;

/// Number of compiled plans kept by the plan cache.
pub const PLAN_CACHE_CAPACITY: usize = 256;

/// Default per-query deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Rows scanned between deadline/cancellation checks.
pub const CANCEL_CHECK_INTERVAL: usize = 256;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a `regex` / `name_pattern` expression.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 200;

/// Compiled regex size limit in bytes.
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Maximum length of a dotted field path.
pub const MAX_FIELD_PATH_LENGTH: usize = 256;

// =============================================================================
// BINDING NAMES
// =============================================================================

/// Default variable for a node pattern.
pub const DEFAULT_NODE_VAR: &str = "node";

/// Default variable for an edge pattern.
pub const DEFAULT_EDGE_VAR: &str = "edge";

/// Default variable for a path's start node.
pub const DEFAULT_START_VAR: &str = "start";

/// Default variable for a path's terminal node.
pub const DEFAULT_END_VAR: &str = "end";

/// Pseudo-binding exposing path-level fields.
pub const PATH_VAR: &str = "path";

/// Names bound implicitly around a single-hop edge.
pub const SOURCE_ALIASES: [&str; 2] = ["source", "subject"];
pub const TARGET_ALIASES: [&str; 2] = ["target", "object"];

/// Node a single-hop join reached from its anchor, whichever endpoint it is.
pub const NEIGHBOR_VAR: &str = "neighbor";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_consistent() {
        const {
            assert!(DEFAULT_MAX_HOPS <= MAX_HOPS_LIMIT);
            assert!(DEFAULT_LIMIT <= MAX_LIMIT);
        }
        assert!(MAX_REGEX_PATTERN_LENGTH < MAX_FIELD_PATH_LENGTH);
    }

    #[test]
    fn implicit_bindings_do_not_collide() {
        for name in SOURCE_ALIASES {
            assert!(!TARGET_ALIASES.contains(&name));
            assert_ne!(name, DEFAULT_NODE_VAR);
            assert_ne!(name, DEFAULT_EDGE_VAR);
        }
    }
}
