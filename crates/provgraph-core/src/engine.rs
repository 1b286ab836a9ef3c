//! # Query Engine
//!
//! The public entry point: validate → plan (cached) → execute in one
//! snapshot.
//!
//! Validation and planning happen before the store is touched, so a
//! malformed query never opens a read transaction.

use crate::cache::PlanCache;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::executor::execute;
use crate::graph::{GraphRead, GraphStore};
use crate::planner::{ExecutionPlan, Planner};
use crate::query::Query;
use crate::result::QueryResult;
use crate::schema::SchemaRegistry;
use crate::types::ProvGraphError;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entity and edge counts of a store snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entities: usize,
    pub edges: usize,
}

/// A query engine over a graph store.
#[derive(Debug)]
pub struct QueryEngine<S> {
    store: S,
    schema: SchemaRegistry,
    config: EngineConfig,
    cache: PlanCache,
}

impl<S: GraphStore> QueryEngine<S> {
    /// Engine with the default configuration.
    pub fn new(store: S) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            schema: SchemaRegistry::new(),
            cache: PlanCache::new(config.limits.plan_cache_capacity),
            config,
        }
    }

    /// Engine with a validated configuration.
    pub fn with_config(store: S, config: EngineConfig) -> Result<Self, ProvGraphError> {
        config.validate()?;
        Ok(Self {
            store,
            schema: SchemaRegistry::new(),
            cache: PlanCache::new(config.limits.plan_cache_capacity),
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Number of compiled plans currently cached.
    pub fn cached_plans(&self) -> usize {
        self.cache.len()
    }

    /// Context carrying the configured deadline. `timeout_ms` of `None` or 0 disables it.
    pub fn default_context(&self) -> ExecutionContext {
        match self.config.limits.timeout_ms {
            Some(ms) if ms > 0 => ExecutionContext::with_timeout(Duration::from_millis(ms)),
            _ => ExecutionContext::new(),
        }
    }

    /// Validate and compile `query`, reusing a cached plan when possible.
    pub fn plan(&self, query: &Query) -> Result<Arc<ExecutionPlan>, ProvGraphError> {
        let key = query.canonical_key()?;
        self.cache.get_or_compile(key, || {
            Planner::new(&self.schema, &self.config.limits).plan(query)
        })
    }

    /// Run `query` under the configured deadline.
    pub fn execute(&self, query: &Query) -> Result<QueryResult, ProvGraphError> {
        self.execute_with(query, &self.default_context())
    }

    /// Run `query` under an explicit context.
    pub fn execute_with(
        &self,
        query: &Query,
        ctx: &ExecutionContext,
    ) -> Result<QueryResult, ProvGraphError> {
        let started = Instant::now();
        let plan = self.plan(query)?;
        let reader = self.store.begin_read()?;
        let mut result = execute(&plan, &reader, ctx).inspect_err(|e| {
            tracing::debug!(code = e.code(), error = %e, "query failed");
        })?;
        result.metadata.query_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Parse a JSON query document and run it.
    pub fn execute_json(&self, value: &serde_json::Value) -> Result<QueryResult, ProvGraphError> {
        self.execute(&Query::from_json(value)?)
    }

    /// Compiled plan summary for `query`; the store is not read.
    pub fn explain(&self, query: &Query) -> Result<serde_json::Value, ProvGraphError> {
        Ok(self.plan(query)?.explain())
    }

    /// Entity and edge counts.
    pub fn stats(&self) -> Result<StoreStats, ProvGraphError> {
        let reader = self.store.begin_read()?;
        Ok(StoreStats {
            entities: reader.entity_count()?,
            edges: reader.edge_count()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::query::NodePattern;
    use crate::types::{Entity, EntityType};

    fn engine() -> QueryEngine<Graph> {
        let mut graph = Graph::new();
        graph
            .insert_entity(Entity::new("drug:a", EntityType::Drug, "Aspirin"))
            .expect("entity");
        QueryEngine::new(graph)
    }

    #[test]
    fn repeated_queries_share_a_plan() {
        let engine = engine();
        let query = Query::nodes(NodePattern::of_type(EntityType::Drug));
        let first = engine.plan(&query).expect("plan");
        let second = engine.plan(&query).expect("plan");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_plans(), 1);
    }

    #[test]
    fn execute_reports_totals() {
        let engine = engine();
        let result = engine
            .execute(&Query::nodes(NodePattern::any()))
            .expect("result");
        assert_eq!(result.metadata.total_results, 1);
        assert_eq!(result.results[0]["node.name"], "Aspirin");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.limits.max_hops_limit = 0;
        assert!(matches!(
            QueryEngine::with_config(Graph::new(), config),
            Err(ProvGraphError::Config(_))
        ));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let mut config = EngineConfig::default();
        config.limits.timeout_ms = Some(0);
        let engine = QueryEngine::with_config(Graph::new(), config).expect("engine");
        assert!(engine.default_context().check().is_ok());
    }

    #[test]
    fn stats_count_the_snapshot() {
        let stats = engine().stats().expect("stats");
        assert_eq!(stats, StoreStats { entities: 1, edges: 0 });
    }
}
