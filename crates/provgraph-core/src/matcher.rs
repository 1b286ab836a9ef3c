//! # Pattern Matchers
//!
//! Compiled forms of [`NodePattern`] and [`EdgePattern`].
//!
//! Names are lowercased and regexes built once, so a match is a handful of
//! comparisons. A node matcher also picks the cheapest anchor scan: id
//! lookup, then the type index, then a full scan.

use crate::field::FieldResolver;
use crate::filter::{RelativeFilter, compile_regex};
use crate::graph::GraphRead;
use crate::query::{EdgePattern, NodePattern, VectorSearch};
use crate::schema::BindingKind;
use crate::similarity::QueryVector;
use crate::types::{
    Direction, Edge, EdgeLayer, Entity, EntityId, EntityType, ProvGraphError, RelationType,
    StudyType,
};
use crate::value::FieldValue;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

// =============================================================================
// NODES
// =============================================================================

/// How the anchor nodes of a pattern are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeScan {
    ById(EntityId),
    ByTypes(Vec<EntityType>),
    Full,
}

impl NodeScan {
    pub(crate) fn label(&self) -> String {
        match self {
            Self::ById(id) => format!("id_lookup({})", id),
            Self::ByTypes(types) => {
                let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
                format!("type_index({})", names.join(","))
            }
            Self::Full => "full_scan".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeMatcher {
    types: BTreeSet<EntityType>,
    id: Option<EntityId>,
    names: BTreeSet<String>,
    name_regex: Option<Regex>,
    external_ids: BTreeMap<String, String>,
    properties: Vec<(String, FieldValue)>,
    filters: Vec<RelativeFilter>,
    similarity: Option<SimilarityMatch>,
}

/// Compiled `vector_search`.
#[derive(Debug, Clone)]
struct SimilarityMatch {
    query: Arc<QueryVector>,
    top_k: Option<usize>,
    min_similarity: Option<f64>,
}

impl NodeMatcher {
    /// A matcher accepting every node.
    pub(crate) fn any() -> Self {
        Self {
            types: BTreeSet::new(),
            id: None,
            names: BTreeSet::new(),
            name_regex: None,
            external_ids: BTreeMap::new(),
            properties: Vec::new(),
            filters: Vec::new(),
            similarity: None,
        }
    }

    /// Compile `pattern`; `prefix` names it in error messages (`node_pattern`).
    pub(crate) fn compile(
        pattern: &NodePattern,
        prefix: &str,
        resolver: &FieldResolver<'_>,
    ) -> Result<Self, ProvGraphError> {
        let name_regex = pattern
            .name_pattern
            .as_deref()
            .map(|p| compile_regex(p, &join(prefix, "name_pattern")))
            .transpose()?;
        let filters = pattern
            .property_filters
            .iter()
            .map(|f| {
                RelativeFilter::compile(f, BindingKind::Node, resolver)
                    .map_err(|e| e.at_field(&join(prefix, "property_filters")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let similarity = pattern
            .vector_search
            .as_ref()
            .map(|search| Self::compile_similarity(search, &join(prefix, "vector_search")))
            .transpose()?;
        Ok(Self {
            types: pattern.types.iter().copied().collect(),
            id: pattern.id.clone(),
            names: pattern.names.iter().map(|n| n.to_lowercase()).collect(),
            name_regex,
            external_ids: pattern.external_ids.clone(),
            properties: pattern
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect(),
            filters,
            similarity,
        })
    }

    fn compile_similarity(
        search: &VectorSearch,
        prefix: &str,
    ) -> Result<SimilarityMatch, ProvGraphError> {
        let invalid = |key: &str, message: String| ProvGraphError::Validation {
            message,
            field: Some(join(prefix, key)),
            allowed: Vec::new(),
        };
        let query = QueryVector::new(search.embedding.clone()).ok_or_else(|| {
            invalid(
                "embedding",
                "embedding must be a non-empty vector of finite numbers, not all zero"
                    .to_string(),
            )
        })?;
        if let Some(min) = search.min_similarity
            && !(-1.0..=1.0).contains(&min)
        {
            return Err(invalid(
                "min_similarity",
                format!("min_similarity must be within [-1, 1], got {}", min),
            ));
        }
        if search.top_k == Some(0) {
            return Err(invalid("top_k", "top_k must be at least 1".to_string()));
        }
        Ok(SimilarityMatch {
            query: Arc::new(query),
            top_k: search.top_k,
            min_similarity: search.min_similarity,
        })
    }

    /// Query embedding of this pattern's `vector_search`, if any.
    pub(crate) fn query_vector(&self) -> Option<&Arc<QueryVector>> {
        self.similarity.as_ref().map(|s| &s.query)
    }

    pub(crate) fn top_k(&self) -> Option<usize> {
        self.similarity.as_ref().and_then(|s| s.top_k)
    }

    /// Scan label for plan explanations, with the similarity cut when present.
    pub(crate) fn anchor_label(&self) -> String {
        let scan = self.scan().label();
        match &self.similarity {
            None => scan,
            Some(s) => match s.top_k {
                Some(k) => format!("{} + top_{}_similar(dim={})", scan, k, s.query.dimension()),
                None => format!("{} + similar(dim={})", scan, s.query.dimension()),
            },
        }
    }

    pub(crate) fn matches(&self, entity: &Entity) -> bool {
        if let Some(similarity) = &self.similarity {
            let Some(score) = similarity.query.score(entity) else {
                return false;
            };
            if similarity.min_similarity.is_some_and(|min| score < min) {
                return false;
            }
        }
        if let Some(id) = &self.id
            && id != &entity.id
        {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&entity.entity_type) {
            return false;
        }
        if !self.names.is_empty() && !self.names.contains(&entity.name.to_lowercase()) {
            return false;
        }
        if let Some(regex) = &self.name_regex
            && !regex.is_match(&entity.name)
        {
            return false;
        }
        let ids_match = self
            .external_ids
            .iter()
            .all(|(ontology, code)| entity.external_ids.get(ontology) == Some(code));
        if !ids_match {
            return false;
        }
        let props_match = self.properties.iter().all(|(key, expected)| {
            entity
                .properties
                .get(key)
                .is_some_and(|v| FieldValue::from_json(v).loosely_equals(expected))
        });
        props_match && self.filters.iter().all(|f| f.test_node(entity))
    }

    pub(crate) fn scan(&self) -> NodeScan {
        if let Some(id) = &self.id {
            NodeScan::ById(id.clone())
        } else if !self.types.is_empty() {
            NodeScan::ByTypes(self.types.iter().copied().collect())
        } else {
            NodeScan::Full
        }
    }

    /// Candidate nodes for this pattern, sorted by id.
    ///
    /// With a `top_k` similarity cut only the `k` most similar matches
    /// survive; ties go to the smaller id.
    pub(crate) fn candidates<G: GraphRead>(
        &self,
        graph: &G,
    ) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        let mut found = match self.scan() {
            NodeScan::ById(id) => graph.entity(&id)?.into_iter().collect(),
            NodeScan::ByTypes(types) => {
                let mut all = Vec::new();
                for entity_type in types {
                    all.extend(graph.entities_of_type(entity_type)?);
                }
                all.sort_by(|a, b| a.id.cmp(&b.id));
                all
            }
            NodeScan::Full => graph.entities()?,
        };
        found.retain(|e| self.matches(e));
        if let Some(similarity) = &self.similarity
            && let Some(k) = similarity.top_k
            && found.len() > k
        {
            let mut scored: Vec<(f64, Arc<Entity>)> = found
                .into_iter()
                .map(|e| (similarity.query.score(&e).unwrap_or(f64::NEG_INFINITY), e))
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
            scored.truncate(k);
            found = scored.into_iter().map(|(_, e)| e).collect();
            found.sort_by(|a, b| a.id.cmp(&b.id));
        }
        Ok(found)
    }
}

// =============================================================================
// EDGES
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct EdgeMatcher {
    relation_types: BTreeSet<RelationType>,
    direction: Direction,
    layer: EdgeLayer,
    min_confidence: Option<f64>,
    min_evidence: Option<usize>,
    require_from: BTreeSet<StudyType>,
    filters: Vec<RelativeFilter>,
}

impl EdgeMatcher {
    /// Any claim edge, followed outgoing.
    pub(crate) fn any_claim() -> Self {
        Self {
            relation_types: BTreeSet::new(),
            direction: Direction::Outgoing,
            layer: EdgeLayer::Claim,
            min_confidence: None,
            min_evidence: None,
            require_from: BTreeSet::new(),
            filters: Vec::new(),
        }
    }

    pub(crate) fn compile(
        pattern: &EdgePattern,
        prefix: &str,
        resolver: &FieldResolver<'_>,
    ) -> Result<Self, ProvGraphError> {
        if let Some(c) = pattern.min_confidence
            && !(0.0..=1.0).contains(&c)
        {
            return Err(ProvGraphError::Validation {
                message: format!("min_confidence must be within [0, 1], got {}", c),
                field: Some(join(prefix, "min_confidence")),
                allowed: Vec::new(),
            });
        }
        if pattern.layer != EdgeLayer::Claim {
            let claim_only = [
                ("min_evidence_count", pattern.min_evidence_count.is_some()),
                ("require_evidence_from", !pattern.require_evidence_from.is_empty()),
            ];
            if let Some((key, _)) = claim_only.iter().find(|(_, set)| *set) {
                return Err(ProvGraphError::Validation {
                    message: format!(
                        "'{}' only applies to claim edges, not the {} layer",
                        key, pattern.layer
                    ),
                    field: Some(join(prefix, key)),
                    allowed: Vec::new(),
                });
            }
        }
        let filters = pattern
            .property_filters
            .iter()
            .map(|f| {
                RelativeFilter::compile(f, BindingKind::Edge, resolver)
                    .map_err(|e| e.at_field(&join(prefix, "property_filters")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            relation_types: pattern.relation_types.iter().copied().collect(),
            direction: pattern.direction,
            layer: pattern.layer,
            min_confidence: pattern.min_confidence,
            min_evidence: pattern.min_evidence_count,
            require_from: pattern.require_evidence_from.iter().copied().collect(),
            filters,
        })
    }

    pub(crate) const fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) const fn layer(&self) -> EdgeLayer {
        self.layer
    }

    /// Edge-local constraints; orientation is checked by the caller.
    pub(crate) fn matches(&self, edge: &Edge) -> bool {
        if edge.layer() != self.layer {
            return false;
        }
        if !self.relation_types.is_empty() && !self.relation_types.contains(&edge.relation_type) {
            return false;
        }
        if let Some(min) = self.min_confidence
            && edge.confidence().is_none_or(|c| c < min)
        {
            return false;
        }
        if let Some(min) = self.min_evidence
            && edge.evidence_count() < min
        {
            return false;
        }
        if !self.require_from.is_empty() {
            let found = edge.as_claim().is_some_and(|claim| {
                claim
                    .evidence()
                    .iter()
                    .any(|e| e.study_type.is_some_and(|s| self.require_from.contains(&s)))
            });
            if !found {
                return false;
            }
        }
        self.filters.iter().all(|f| f.test_edge(edge))
    }

    /// Edges leaving `node` under this pattern's direction, sorted by edge id.
    ///
    /// Each edge comes with the entity it leads to. Evidence-support edges
    /// point at a claim rather than an entity, so they are returned with no
    /// neighbour when `node` is their evidence line.
    pub(crate) fn expand<G: GraphRead>(
        &self,
        graph: &G,
        node: &EntityId,
    ) -> Result<Vec<(Arc<Edge>, Option<EntityId>)>, ProvGraphError> {
        let mut candidates: BTreeMap<_, Arc<Edge>> = BTreeMap::new();
        for edge in graph.outgoing(node)?.into_iter().chain(graph.incoming(node)?) {
            candidates.entry(edge.id.clone()).or_insert(edge);
        }
        let mut out = Vec::new();
        for edge in candidates.into_values() {
            if !self.matches(&edge) {
                continue;
            }
            if edge.target_entity().is_none() {
                if &edge.source_id == node && self.direction != Direction::Incoming {
                    out.push((edge, None));
                }
            } else if let Some(next) = edge.other_endpoint(node, self.direction) {
                let next = next.clone();
                out.push((edge, Some(next)));
            }
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================
