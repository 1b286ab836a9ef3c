//! # Plan Cache
//!
//! Read-through cache of compiled plans keyed by the canonical query text.
//!
//! Compilation is a pure function of the query and the schema registry, so
//! one plan can be shared by any number of concurrent executions. The cache
//! is bounded; on overflow the oldest key is evicted.

use crate::planner::ExecutionPlan;
use crate::types::ProvGraphError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Entries {
    plans: BTreeMap<String, Arc<ExecutionPlan>>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub(crate) struct PlanCache {
    capacity: usize,
    inner: RwLock<Entries>,
}

impl PlanCache {
    /// A capacity of zero disables caching.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Entries::default()),
        }
    }

    /// Return the cached plan for `key`, compiling and storing it on a miss.
    pub(crate) fn get_or_compile<F>(
        &self,
        key: String,
        compile: F,
    ) -> Result<Arc<ExecutionPlan>, ProvGraphError>
    where
        F: FnOnce() -> Result<ExecutionPlan, ProvGraphError>,
    {
        if self.capacity == 0 {
            return compile().map(Arc::new);
        }

        {
            // Inserts never leave the map half-written, so poison is ignored.
            let entries = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(plan) = entries.plans.get(&key) {
                tracing::debug!("plan cache hit");
                return Ok(Arc::clone(plan));
            }
        }

        let plan = Arc::new(compile()?);
        let mut entries = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.plans.get(&key) {
            return Ok(Arc::clone(existing));
        }
        while entries.plans.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.plans.remove(&oldest);
        }
        entries.order.push_back(key.clone());
        entries.plans.insert(key, Arc::clone(&plan));
        Ok(plan)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .plans
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::planner::Planner;
    use crate::query::{NodePattern, Query};
    use crate::schema::SchemaRegistry;
    use crate::types::EntityType;

    fn compile(query: &Query) -> Result<ExecutionPlan, ProvGraphError> {
        let schema = SchemaRegistry::new();
        Planner::new(&schema, &Limits::default()).plan(query)
    }

    #[test]
    fn hit_returns_same_plan() {
        let cache = PlanCache::new(4);
        let query = Query::nodes(NodePattern::of_type(EntityType::Drug));
        let a = cache
            .get_or_compile("q".to_string(), || compile(&query))
            .expect("plan");
        let b = cache
            .get_or_compile("q".to_string(), || {
                Err(ProvGraphError::validation("should not recompile"))
            })
            .expect("cached");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let cache = PlanCache::new(2);
        let query = Query::nodes(NodePattern::any());
        for key in ["a", "b", "c"] {
            cache
                .get_or_compile(key.to_string(), || compile(&query))
                .expect("plan");
        }
        assert_eq!(cache.len(), 2);
        let recompiled = cache.get_or_compile("a".to_string(), || {
            Err(ProvGraphError::validation("evicted"))
        });
        assert!(recompiled.is_err());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let cache = PlanCache::new(0);
        let query = Query::nodes(NodePattern::any());
        cache
            .get_or_compile("a".to_string(), || compile(&query))
            .expect("plan");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn compile_errors_are_not_cached() {
        let cache = PlanCache::new(2);
        let failed = cache.get_or_compile("bad".to_string(), || {
            Err(ProvGraphError::validation("nope"))
        });
        assert!(failed.is_err());
        assert_eq!(cache.len(), 0);
    }
}
