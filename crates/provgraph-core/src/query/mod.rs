//! # Query Module
//!
//! The declarative pattern language.
//!
//! A [`Query`] picks a result shape (`nodes`, `edges`, `paths`, `subgraph`)
//! and composes node/edge/path patterns, filters, aggregation, ordering and
//! pagination. Queries arrive as JSON and are parsed by [`Query::from_json`],
//! which rejects every key the schema registry does not know; they can also be
//! assembled in Rust with the builder helpers below.

mod parse;

pub use parse::parse_query;

use crate::primitives::DEFAULT_MAX_HOPS;
use crate::types::{
    Direction, EdgeLayer, EntityId, EntityType, ProvGraphError, RelationType, StudyType,
    closed_enum,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

// =============================================================================
// VOCABULARIES
// =============================================================================

closed_enum! {
    /// Result shape selected by `find`.
    FindType, "find type" {
        Nodes => "nodes",
        Edges => "edges",
        Paths => "paths",
        Subgraph => "subgraph",
    }
}

closed_enum! {
    /// Filter operator.
    Operator, "operator" {
        Eq => "eq",
        Ne => "ne" | "neq",
        Gt => "gt",
        Gte => "gte",
        Lt => "lt",
        Lte => "lte",
        In => "in",
        Contains => "contains",
        Regex => "regex",
    }
}

closed_enum! {
    /// Aggregation function.
    AggFunc, "aggregation function" {
        Count => "count",
        Sum => "sum",
        Avg => "avg" | "mean",
        Min => "min",
        Max => "max",
    }
}

closed_enum! {
    /// Sort direction for `order_by`.
    SortDirection, "sort direction" {
        Asc => "asc" | "ascending",
        Desc => "desc" | "descending",
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Outgoing
    }
}

impl Default for EdgeLayer {
    fn default() -> Self {
        Self::Claim
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Asc
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// `{field, operator, value}` predicate over a dotted field path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: serde_json::Value,
}

impl Filter {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, Operator::Eq, value)
    }
}

// =============================================================================
// PATTERNS
// =============================================================================

/// Template matching entities.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NodePattern {
    /// Accepted types; empty means any.
    pub types: Vec<EntityType>,
    pub id: Option<EntityId>,
    /// Exact names (case-insensitive); empty means any.
    pub names: Vec<String>,
    pub name_pattern: Option<String>,
    pub external_ids: BTreeMap<String, String>,
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Filters relative to the node (`name`, `properties.x`, ...).
    pub property_filters: Vec<Filter>,
    pub vector_search: Option<VectorSearch>,
    pub var: Option<String>,
}

/// Similarity search against entity embeddings.
///
/// The caller supplies the query embedding; the engine only compares it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VectorSearch {
    pub embedding: Vec<f64>,
    /// Keep only the best `top_k` matches of the pattern.
    pub top_k: Option<usize>,
    /// Inclusive lower bound on cosine similarity.
    pub min_similarity: Option<f64>,
}

impl VectorSearch {
    #[must_use]
    pub fn new(embedding: Vec<f64>) -> Self {
        Self {
            embedding,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    #[must_use]
    pub fn min_similarity(mut self, threshold: f64) -> Self {
        self.min_similarity = Some(threshold);
        self
    }
}

impl NodePattern {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of_type(entity_type: EntityType) -> Self {
        Self {
            types: vec![entity_type],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(EntityId::new(id));
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    #[must_use]
    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.property_filters.push(filter);
        self
    }

    #[must_use]
    pub fn similar_to(mut self, search: VectorSearch) -> Self {
        self.vector_search = Some(search);
        self
    }

    #[must_use]
    pub fn bind(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }
}

/// Template matching edges of a single layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EdgePattern {
    /// Accepted relation types; empty means any.
    pub relation_types: Vec<RelationType>,
    pub direction: Direction,
    pub layer: EdgeLayer,
    pub min_confidence: Option<f64>,
    pub property_filters: Vec<Filter>,
    pub min_evidence_count: Option<usize>,
    /// At least one evidence item must come from one of these study designs.
    pub require_evidence_from: Vec<StudyType>,
    pub var: Option<String>,
}

impl EdgePattern {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of_relation(relation_type: RelationType) -> Self {
        Self {
            relation_types: vec![relation_type],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn layer(mut self, layer: EdgeLayer) -> Self {
        self.layer = layer;
        self
    }

    #[must_use]
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn min_evidence(mut self, count: usize) -> Self {
        self.min_evidence_count = Some(count);
        self
    }

    #[must_use]
    pub fn require_evidence_from(mut self, study_types: Vec<StudyType>) -> Self {
        self.require_evidence_from = study_types;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.property_filters.push(filter);
        self
    }

    #[must_use]
    pub fn bind(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }
}

/// One hop of a path pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub edge: EdgePattern,
    pub node: NodePattern,
}

/// Multi-hop template. An empty `steps` list means "any claim edge" per hop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathPattern {
    pub start: NodePattern,
    pub steps: Vec<PathStep>,
    pub end: Option<NodePattern>,
    pub max_hops: usize,
    pub avoid_cycles: bool,
    pub shortest_path: bool,
    pub all_paths: bool,
}

impl PathPattern {
    #[must_use]
    pub fn from(start: NodePattern) -> Self {
        Self {
            start,
            steps: Vec::new(),
            end: None,
            max_hops: DEFAULT_MAX_HOPS,
            avoid_cycles: true,
            shortest_path: false,
            all_paths: true,
        }
    }

    #[must_use]
    pub fn step(mut self, edge: EdgePattern, node: NodePattern) -> Self {
        self.steps.push(PathStep { edge, node });
        self
    }

    #[must_use]
    pub fn ending_at(mut self, end: NodePattern) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    #[must_use]
    pub fn allow_cycles(mut self) -> Self {
        self.avoid_cycles = false;
        self
    }

    #[must_use]
    pub fn shortest(mut self) -> Self {
        self.shortest_path = true;
        self.all_paths = false;
        self
    }
}

// =============================================================================
// AGGREGATION & ORDERING
// =============================================================================

/// A named aggregate column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedAggregation {
    pub name: String,
    pub function: AggFunc,
    pub field: String,
}

/// `group_by` fields plus named aggregates, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AggregationSpec {
    pub group_by: Vec<String>,
    pub aggregations: Vec<NamedAggregation>,
}

impl AggregationSpec {
    #[must_use]
    pub fn group_by(fields: &[&str]) -> Self {
        Self {
            group_by: fields.iter().map(|f| (*f).to_string()).collect(),
            aggregations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, function: AggFunc, field: &str) -> Self {
        self.aggregations.push(NamedAggregation {
            name: name.to_string(),
            function,
            field: field.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

// =============================================================================
// QUERY
// =============================================================================

/// A complete declarative query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub find: FindType,
    pub node_pattern: Option<NodePattern>,
    pub edge_pattern: Option<EdgePattern>,
    pub path_pattern: Option<PathPattern>,
    pub filters: Vec<Filter>,
    pub aggregate: Option<AggregationSpec>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub return_fields: Vec<String>,
}

impl Query {
    fn shape(find: FindType) -> Self {
        Self {
            find,
            node_pattern: None,
            edge_pattern: None,
            path_pattern: None,
            filters: Vec::new(),
            aggregate: None,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
            return_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn nodes(pattern: NodePattern) -> Self {
        Self {
            node_pattern: Some(pattern),
            ..Self::shape(FindType::Nodes)
        }
    }

    #[must_use]
    pub fn edges(pattern: EdgePattern) -> Self {
        Self {
            edge_pattern: Some(pattern),
            ..Self::shape(FindType::Edges)
        }
    }

    #[must_use]
    pub fn paths(pattern: PathPattern) -> Self {
        Self {
            path_pattern: Some(pattern),
            ..Self::shape(FindType::Paths)
        }
    }

    #[must_use]
    pub fn subgraph(pattern: NodePattern) -> Self {
        Self {
            node_pattern: Some(pattern),
            ..Self::shape(FindType::Subgraph)
        }
    }

    #[must_use]
    pub fn with_node(mut self, pattern: NodePattern) -> Self {
        self.node_pattern = Some(pattern);
        self
    }

    #[must_use]
    pub fn with_edge(mut self, pattern: EdgePattern) -> Self {
        self.edge_pattern = Some(pattern);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn aggregate(mut self, spec: AggregationSpec) -> Self {
        self.aggregate = Some(spec);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn returning(mut self, fields: &[&str]) -> Self {
        self.return_fields = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    /// Validate and parse a JSON query document.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ProvGraphError> {
        parse_query(value)
    }

    /// Stable textual form used as the plan cache key.
    pub fn canonical_key(&self) -> Result<String, ProvGraphError> {
        serde_json::to_string(self)
            .map_err(|e| ProvGraphError::validation(format!("Query is not serializable: {}", e)))
    }
}

impl FromStr for Query {
    type Err = ProvGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| ProvGraphError::validation(format!("Malformed query JSON: {}", e)))?;
        parse_query(&value)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let q = Query::nodes(NodePattern::of_type(EntityType::Drug))
            .with_edge(EdgePattern::of_relation(RelationType::Treats).min_confidence(0.7));
        assert_eq!(q.find, FindType::Nodes);
        let edge = q.edge_pattern.as_ref().expect("edge");
        assert_eq!(edge.direction, Direction::Outgoing);
        assert_eq!(edge.layer, EdgeLayer::Claim);
        assert_eq!(q.offset, 0);
        assert!(q.limit.is_none());
    }

    #[test]
    fn path_defaults() {
        let p = PathPattern::from(NodePattern::any());
        assert_eq!(p.max_hops, DEFAULT_MAX_HOPS);
        assert!(p.avoid_cycles);
        assert!(p.all_paths);
        assert!(!p.shortest_path);
        let s = p.shortest();
        assert!(s.shortest_path && !s.all_paths);
    }

    #[test]
    fn canonical_key_is_stable() {
        let a = Query::nodes(NodePattern::of_type(EntityType::Gene)).limit(5);
        let b = Query::nodes(NodePattern::of_type(EntityType::Gene)).limit(5);
        assert_eq!(
            a.canonical_key().expect("key"),
            b.canonical_key().expect("key")
        );
        let c = Query::nodes(NodePattern::of_type(EntityType::Gene)).limit(6);
        assert_ne!(
            a.canonical_key().expect("key"),
            c.canonical_key().expect("key")
        );
    }

    #[test]
    fn from_str_rejects_malformed_json() {
        let err = "{not json".parse::<Query>().expect_err("malformed");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
