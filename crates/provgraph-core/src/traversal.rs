//! # Frontier Traversal
//!
//! Bounded breadth-first path expansion for `find: paths`.
//!
//! Every partial path is a [`PathState`] in an arena; a state knows its
//! parent, the node it reached, the edge taken and the nodes already on
//! the path. A `VecDeque` of arena indices is the frontier. Expansion stops
//! at `max_hops`, at the end of a fixed step list, or when the state budget
//! runs out (an error, never a truncated result).
//!
//! Breadth-first order means the first path found between a (start, end)
//! pair is a shortest one, which is what `shortest_path` relies on.

use crate::context::ExecutionContext;
use crate::executor::EntityCache;
use crate::graph::GraphRead;
use crate::planner::{HopSchedule, TraversalPlan};
use crate::row::{Bound, PathSummary, Row};
use crate::types::{Edge, Entity, EntityId, ExecutionFault, ProvGraphError};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

#[derive(Debug)]
struct PathState {
    parent: Option<usize>,
    node: Arc<Entity>,
    edge: Option<Arc<Edge>>,
    depth: usize,
    visited: BTreeSet<EntityId>,
}

struct Arena {
    states: Vec<PathState>,
    budget: usize,
}

impl Arena {
    fn push(&mut self, state: PathState) -> Result<usize, ProvGraphError> {
        if self.states.len() >= self.budget {
            tracing::warn!(budget = self.budget, "traversal state budget exhausted");
            return Err(ExecutionFault::BudgetExhausted(self.budget).into());
        }
        self.states.push(state);
        Ok(self.states.len() - 1)
    }

    fn get(&self, idx: usize) -> Result<&PathState, ProvGraphError> {
        self.states.get(idx).ok_or_else(|| {
            ProvGraphError::DataIntegrity(format!("traversal state {} out of range", idx))
        })
    }

    /// State indices from the root to `idx`.
    fn chain(&self, idx: usize) -> Result<Vec<usize>, ProvGraphError> {
        let mut out = vec![idx];
        let mut current = self.get(idx)?;
        while let Some(parent) = current.parent {
            out.push(parent);
            current = self.get(parent)?;
        }
        out.reverse();
        Ok(out)
    }
}

/// Expand `plan` over `entities`' graph into rows of `width` slots.
pub(crate) fn traverse<G: GraphRead>(
    plan: &TraversalPlan,
    width: usize,
    entities: &mut EntityCache<'_, G>,
    ctx: &ExecutionContext,
) -> Result<Vec<Row>, ProvGraphError> {
    let fixed = plan.fixed_length();
    let depth_limit = fixed.unwrap_or(plan.max_hops);
    let mut arena = Arena {
        states: Vec::new(),
        budget: plan.max_states,
    };
    let mut frontier = VecDeque::new();
    let mut shortest: BTreeMap<(EntityId, EntityId), usize> = BTreeMap::new();
    let mut rows = Vec::new();

    for start in plan.start.candidates(entities.graph())? {
        entities.remember(&start);
        let idx = arena.push(PathState {
            parent: None,
            visited: BTreeSet::from([start.id.clone()]),
            node: start,
            edge: None,
            depth: 0,
        })?;
        frontier.push_back(idx);
    }

    while let Some(idx) = frontier.pop_front() {
        ctx.check()?;
        let (node_id, depth) = {
            let state = arena.get(idx)?;
            (state.node.id.clone(), state.depth)
        };
        if depth >= depth_limit {
            continue;
        }
        let (edge_matcher, node_matcher) = match &plan.hops {
            HopSchedule::Fixed(hops) => match hops.get(depth) {
                Some(hop) => (&hop.edge, Some(&hop.node)),
                None => continue,
            },
            HopSchedule::Variable { edge, .. } => (edge, None),
        };

        for (edge, next_id) in edge_matcher.expand(entities.graph(), &node_id)? {
            let Some(next_id) = next_id else {
                continue;
            };
            if plan.avoid_cycles && arena.get(idx)?.visited.contains(&next_id) {
                continue;
            }
            let next = entities.get(&next_id, &edge.id)?;
            if node_matcher.is_some_and(|m| !m.matches(&next)) {
                continue;
            }
            let next_depth = depth + 1;
            let terminal = fixed.is_none_or(|n| next_depth == n);
            let emit = terminal && plan.end.matches(&next);
            if fixed.is_some() && terminal && !emit {
                continue;
            }

            let mut visited = arena.get(idx)?.visited.clone();
            visited.insert(next_id);
            let child = arena.push(PathState {
                parent: Some(idx),
                node: next,
                edge: Some(edge),
                depth: next_depth,
                visited,
            })?;

            if emit {
                let chain = arena.chain(child)?;
                if !plan.shortest || keep_shortest(&arena, &chain, &mut shortest)? {
                    rows.push(build_row(plan, width, &arena, &chain)?);
                }
            }
            if next_depth < depth_limit {
                frontier.push_back(child);
            }
        }
    }

    tracing::debug!(
        states = arena.states.len(),
        paths = rows.len(),
        "traversal finished"
    );
    Ok(rows)
}

/// Record the path's length for its (start, end) pair; false if a shorter one exists.
fn keep_shortest(
    arena: &Arena,
    chain: &[usize],
    best: &mut BTreeMap<(EntityId, EntityId), usize>,
) -> Result<bool, ProvGraphError> {
    let (Some(first), Some(last)) = (chain.first(), chain.last()) else {
        return Ok(false);
    };
    let key = (
        arena.get(*first)?.node.id.clone(),
        arena.get(*last)?.node.id.clone(),
    );
    let length = chain.len() - 1;
    match best.get(&key) {
        Some(found) if *found < length => Ok(false),
        _ => {
            best.insert(key, length);
            Ok(true)
        }
    }
}

fn build_row(
    plan: &TraversalPlan,
    width: usize,
    arena: &Arena,
    chain: &[usize],
) -> Result<Row, ProvGraphError> {
    let states = chain
        .iter()
        .map(|i| arena.get(*i))
        .collect::<Result<Vec<_>, _>>()?;
    let mut row = Row::new(width);
    let mut summary = PathSummary {
        node_ids: Vec::with_capacity(states.len()),
        edge_ids: Vec::with_capacity(states.len()),
        relation_types: Vec::with_capacity(states.len()),
    };

    for (i, state) in states.iter().enumerate() {
        summary.node_ids.push(state.node.id.clone());
        if i == 0 {
            row.set(plan.start_slot, Bound::Node(Arc::clone(&state.node)));
        }
        if let Some(edge) = &state.edge {
            summary.edge_ids.push(edge.id.clone());
            summary.relation_types.push(edge.relation_type);
        }
        if let (HopSchedule::Fixed(hops), Some(edge)) = (&plan.hops, &state.edge)
            && let Some(hop) = i.checked_sub(1).and_then(|h| hops.get(h))
        {
            row.set(hop.edge_slot, Bound::Edge(Arc::clone(edge)));
            row.set(hop.node_slot, Bound::Node(Arc::clone(&state.node)));
        }
    }
    if let (HopSchedule::Variable { end_slot, .. }, Some(last)) = (&plan.hops, states.last()) {
        row.set(*end_slot, Bound::Node(Arc::clone(&last.node)));
    }
    row.set(plan.path_slot, Bound::Path(Arc::new(summary)));
    Ok(row)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::confidence::WeightTable;
    use crate::graph::Graph;
    use crate::planner::{PlanShape, Planner};
    use crate::query::{EdgePattern, NodePattern, PathPattern, Query};
    use crate::schema::SchemaRegistry;
    use crate::types::{
        ClaimEdge, EntityType, Evidence, ExtractionMethod, Probability, RelationType,
        SectionType,
    };

    fn claim(id: &str, from: &str, to: &str) -> Edge {
        let evidence = Evidence::new(
            "pmid:1",
            SectionType::Results,
            ExtractionMethod::Manual,
            Probability::new(0.8).expect("probability"),
        );
        let claim = ClaimEdge::new(vec![evidence], &WeightTable::default()).expect("claim");
        Edge::claim(id, from, to, RelationType::Treats, claim)
    }

    /// a -> b -> a cycle plus a -> c -> d chain and a direct a -> d.
    fn graph() -> Graph {
        let mut g = Graph::new();
        for id in ["a", "b", "c", "d"] {
            g.insert_entity(Entity::new(id, EntityType::Drug, id.to_uppercase()))
                .expect("entity");
        }
        for (id, from, to) in [
            ("e1", "a", "b"),
            ("e2", "b", "a"),
            ("e3", "a", "c"),
            ("e4", "c", "d"),
            ("e5", "a", "d"),
        ] {
            g.insert_edge(claim(id, from, to)).expect("edge");
        }
        g
    }

    fn run(pattern: PathPattern, limits: &Limits) -> Result<Vec<Vec<String>>, ProvGraphError> {
        let schema = SchemaRegistry::new();
        let plan = Planner::new(&schema, limits).plan(&Query::paths(pattern))?;
        let PlanShape::Traversal(t) = &plan.shape else {
            return Err(ProvGraphError::validation("not a traversal"));
        };
        let g = graph();
        let mut cache = EntityCache::new(&g);
        let rows = traverse(t, plan.bindings.width(), &mut cache, &ExecutionContext::new())?;
        Ok(rows
            .iter()
            .map(|row| match row.get(t.path_slot) {
                Some(Bound::Path(p)) => p.node_ids.iter().map(ToString::to_string).collect(),
                _ => Vec::new(),
            })
            .collect())
    }

    #[test]
    fn cycles_are_avoided() {
        let pattern = PathPattern::from(NodePattern::any().with_id("a")).max_hops(3);
        let paths = run(pattern, &Limits::default()).expect("paths");
        assert!(!paths.is_empty());
        for path in &paths {
            let unique: BTreeSet<_> = path.iter().collect();
            assert_eq!(unique.len(), path.len(), "repeated node in {:?}", path);
        }
    }

    #[test]
    fn cycles_allowed_when_requested() {
        let pattern = PathPattern::from(NodePattern::any().with_id("a"))
            .max_hops(2)
            .allow_cycles();
        let paths = run(pattern, &Limits::default()).expect("paths");
        assert!(paths.contains(&vec!["a".to_string(), "b".to_string(), "a".to_string()]));
    }

    #[test]
    fn fixed_steps_emit_exact_length() {
        let pattern = PathPattern::from(NodePattern::any().with_id("a"))
            .step(EdgePattern::any(), NodePattern::any())
            .step(EdgePattern::any(), NodePattern::any().with_id("d"));
        let paths = run(pattern, &Limits::default()).expect("paths");
        assert_eq!(paths, vec![vec!["a", "c", "d"]]);
    }

    #[test]
    fn shortest_keeps_minimal_paths_per_pair() {
        let pattern = PathPattern::from(NodePattern::any().with_id("a"))
            .ending_at(NodePattern::any().with_id("d"))
            .shortest();
        let paths = run(pattern, &Limits::default()).expect("paths");
        assert_eq!(paths, vec![vec!["a", "d"]]);
    }

    #[test]
    fn all_paths_keeps_every_route() {
        let pattern = PathPattern::from(NodePattern::any().with_id("a"))
            .ending_at(NodePattern::any().with_id("d"));
        let paths = run(pattern, &Limits::default()).expect("paths");
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn state_budget_is_enforced() {
        let limits = Limits {
            max_traversal_states: 2,
            ..Limits::default()
        };
        let pattern = PathPattern::from(NodePattern::any()).max_hops(3);
        assert!(matches!(
            run(pattern, &limits),
            Err(ProvGraphError::Execution(ExecutionFault::BudgetExhausted(2)))
        ));
    }
}
