//! # Graph Store
//!
//! The read interface the executor runs against, and the in-memory store.
//!
//! `GraphStore` hands out read snapshots; `GraphRead` is the snapshot's
//! lookup surface. All listings come back sorted by id so every store
//! yields rows in the same order. All data structures use `BTreeMap` for
//! deterministic ordering.

use crate::confidence::WeightTable;
use crate::dataset::Dataset;
use crate::types::{
    Edge, EdgeId, EdgeLayer, EdgeTarget, Entity, EntityId, EntityType, ProvGraphError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Lookups over one consistent snapshot of the graph.
///
/// All fallible operations return `Result<T, ProvGraphError>` so in-memory
/// and persistent stores are used uniformly.
pub trait GraphRead {
    fn entity(&self, id: &EntityId) -> Result<Option<Arc<Entity>>, ProvGraphError>;

    /// Every entity, sorted by id.
    fn entities(&self) -> Result<Vec<Arc<Entity>>, ProvGraphError>;

    /// Entities of one type, sorted by id.
    fn entities_of_type(&self, entity_type: EntityType)
    -> Result<Vec<Arc<Entity>>, ProvGraphError>;

    fn edge(&self, id: &EdgeId) -> Result<Option<Arc<Edge>>, ProvGraphError>;

    /// Every edge of every layer, sorted by id.
    fn edges(&self) -> Result<Vec<Arc<Edge>>, ProvGraphError>;

    /// Edges whose source is `id`, sorted by edge id.
    fn outgoing(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError>;

    /// Edges whose target entity is `id`, sorted by edge id.
    fn incoming(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError>;

    fn entity_count(&self) -> Result<usize, ProvGraphError>;

    fn edge_count(&self) -> Result<usize, ProvGraphError>;
}

impl<T: GraphRead + ?Sized> GraphRead for &T {
    fn entity(&self, id: &EntityId) -> Result<Option<Arc<Entity>>, ProvGraphError> {
        (**self).entity(id)
    }

    fn entities(&self) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        (**self).entities()
    }

    fn entities_of_type(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        (**self).entities_of_type(entity_type)
    }

    fn edge(&self, id: &EdgeId) -> Result<Option<Arc<Edge>>, ProvGraphError> {
        (**self).edge(id)
    }

    fn edges(&self) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        (**self).edges()
    }

    fn outgoing(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        (**self).outgoing(id)
    }

    fn incoming(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        (**self).incoming(id)
    }

    fn entity_count(&self) -> Result<usize, ProvGraphError> {
        (**self).entity_count()
    }

    fn edge_count(&self) -> Result<usize, ProvGraphError> {
        (**self).edge_count()
    }
}

/// A shareable source of read snapshots.
///
/// A query opens exactly one snapshot and never writes through it.
pub trait GraphStore: Send + Sync {
    type Reader<'a>: GraphRead
    where
        Self: 'a;

    fn begin_read(&self) -> Result<Self::Reader<'_>, ProvGraphError>;
}

// =============================================================================
// IN-MEMORY GRAPH
// =============================================================================

/// In-memory graph with adjacency and type indexes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    entities: BTreeMap<EntityId, Arc<Entity>>,
    edges: BTreeMap<EdgeId, Arc<Edge>>,
    /// source entity -> edge ids (all layers)
    outgoing: BTreeMap<EntityId, BTreeSet<EdgeId>>,
    /// target entity -> edge ids (entity-targeted layers)
    incoming: BTreeMap<EntityId, BTreeSet<EdgeId>>,
    type_index: BTreeMap<EntityType, BTreeSet<EntityId>>,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a graph from a dataset.
    pub fn from_dataset(dataset: &Dataset, weights: &WeightTable) -> Result<Self, ProvGraphError> {
        let mut graph = Self::new();
        for entity in &dataset.entities {
            graph.insert_entity(entity.clone())?;
        }
        for edge in dataset.typed_edges(weights)? {
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }

    /// Add an entity. Ids are owned by the resolution process, so a repeat is a fault.
    pub fn insert_entity(&mut self, entity: Entity) -> Result<(), ProvGraphError> {
        entity.check_embedding()?;
        if self.entities.contains_key(&entity.id) {
            return Err(ProvGraphError::DataIntegrity(format!(
                "duplicate entity id '{}'",
                entity.id
            )));
        }
        self.type_index
            .entry(entity.entity_type)
            .or_default()
            .insert(entity.id.clone());
        self.entities.insert(entity.id.clone(), Arc::new(entity));
        Ok(())
    }

    /// Add an edge whose endpoints already exist.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<(), ProvGraphError> {
        if self.edges.contains_key(&edge.id) {
            return Err(ProvGraphError::DataIntegrity(format!(
                "duplicate edge id '{}'",
                edge.id
            )));
        }
        self.check_endpoints(&edge)?;

        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .insert(edge.id.clone());
        if let EdgeTarget::Entity(target) = &edge.target {
            self.incoming
                .entry(target.clone())
                .or_default()
                .insert(edge.id.clone());
        }
        self.edges.insert(edge.id.clone(), Arc::new(edge));
        Ok(())
    }

    fn check_endpoints(&self, edge: &Edge) -> Result<(), ProvGraphError> {
        let dangling = |what: &str, id: &str| {
            ProvGraphError::DataIntegrity(format!(
                "edge '{}' references missing {} '{}'",
                edge.id, what, id
            ))
        };
        let source = self
            .entities
            .get(&edge.source_id)
            .ok_or_else(|| dangling("source entity", edge.source_id.as_str()))?;

        match &edge.target {
            EdgeTarget::Entity(target) => {
                if !self.entities.contains_key(target) {
                    return Err(dangling("target entity", target.as_str()));
                }
            }
            EdgeTarget::Claim(claim) => {
                if source.entity_type != EntityType::EvidenceLine {
                    return Err(ProvGraphError::DataIntegrity(format!(
                        "evidence-support edge '{}' must start at an evidence_line, not {}",
                        edge.id, source.entity_type
                    )));
                }
                let target = self
                    .edges
                    .get(claim)
                    .ok_or_else(|| dangling("claim edge", claim.as_str()))?;
                if target.layer() != EdgeLayer::Claim {
                    return Err(ProvGraphError::DataIntegrity(format!(
                        "evidence-support edge '{}' targets non-claim edge '{}'",
                        edge.id, claim
                    )));
                }
            }
        }
        Ok(())
    }

    fn resolve_edges(&self, ids: Option<&BTreeSet<EdgeId>>) -> Vec<Arc<Edge>> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).cloned())
            .collect()
    }
}

impl GraphRead for Graph {
    fn entity(&self, id: &EntityId) -> Result<Option<Arc<Entity>>, ProvGraphError> {
        Ok(self.entities.get(id).cloned())
    }

    fn entities(&self) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        Ok(self.entities.values().cloned().collect())
    }

    fn entities_of_type(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        Ok(self
            .type_index
            .get(&entity_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect())
    }

    fn edge(&self, id: &EdgeId) -> Result<Option<Arc<Edge>>, ProvGraphError> {
        Ok(self.edges.get(id).cloned())
    }

    fn edges(&self) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        Ok(self.edges.values().cloned().collect())
    }

    fn outgoing(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        Ok(self.resolve_edges(self.outgoing.get(id)))
    }

    fn incoming(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        Ok(self.resolve_edges(self.incoming.get(id)))
    }

    fn entity_count(&self) -> Result<usize, ProvGraphError> {
        Ok(self.entities.len())
    }

    fn edge_count(&self) -> Result<usize, ProvGraphError> {
        Ok(self.edges.len())
    }
}

impl GraphStore for Graph {
    type Reader<'a> = &'a Graph;

    fn begin_read(&self) -> Result<Self::Reader<'_>, ProvGraphError> {
        Ok(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================
