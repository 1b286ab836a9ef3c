//! # Storage Backends
//!
//! One store type for both deployments:
//! - `InMemory`: an in-memory [`Graph`] loaded from a dataset (fast, volatile)
//! - `Persistent`: a [`RedbGraph`] for disk-backed ACID storage
//!
//! Callers that choose the backend at runtime (the CLI, the HTTP server)
//! hold a `StorageBackend` and hand it to the engine like any other store.

use crate::confidence::WeightTable;
use crate::dataset::Dataset;
use crate::graph::{Graph, GraphRead, GraphStore};
use crate::storage::{ImportSummary, RedbGraph, RedbReader};
use crate::types::{Edge, EdgeId, Entity, EntityId, EntityType, ProvGraphError};
use std::path::Path;
use std::sync::Arc;

/// Where the graph lives.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory graph (fast, volatile).
    InMemory(Graph),
    /// Disk-backed graph using redb (ACID, persistent).
    Persistent(RedbGraph),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(Graph::new())
    }
}

impl StorageBackend {
    /// Open or create a redb database at `path`.
    pub fn redb(path: impl AsRef<Path>, weights: WeightTable) -> Result<Self, ProvGraphError> {
        Ok(Self::Persistent(RedbGraph::open(path, weights)?))
    }

    /// Build an in-memory graph from a dataset.
    pub fn in_memory(dataset: &Dataset, weights: &WeightTable) -> Result<Self, ProvGraphError> {
        Ok(Self::InMemory(Graph::from_dataset(dataset, weights)?))
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "memory",
            Self::Persistent(_) => "redb",
        }
    }

    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// Add a dataset to the store.
    ///
    /// The persistent backend writes it in one transaction. The in-memory
    /// backend validates against a copy and swaps it in only on success,
    /// so a failed import leaves either backend unchanged.
    pub fn import(
        &mut self,
        dataset: &Dataset,
        weights: &WeightTable,
    ) -> Result<ImportSummary, ProvGraphError> {
        match self {
            Self::Persistent(redb) => redb.import(dataset),
            Self::InMemory(graph) => {
                let mut staged = graph.clone();
                for entity in &dataset.entities {
                    staged.insert_entity(entity.clone())?;
                }
                let edges = dataset.typed_edges(weights)?;
                let summary = ImportSummary {
                    entities: dataset.entities.len(),
                    edges: edges.len(),
                };
                for edge in edges {
                    staged.insert_edge(edge)?;
                }
                *graph = staged;
                tracing::info!(
                    entities = summary.entities,
                    edges = summary.edges,
                    "dataset loaded into memory"
                );
                Ok(summary)
            }
        }
    }
}

impl GraphStore for StorageBackend {
    type Reader<'a> = BackendReader<'a>;

    fn begin_read(&self) -> Result<Self::Reader<'_>, ProvGraphError> {
        match self {
            Self::InMemory(graph) => Ok(BackendReader::InMemory(graph)),
            Self::Persistent(redb) => Ok(BackendReader::Persistent(redb.begin_read()?)),
        }
    }
}

/// Snapshot of either backend.
#[derive(Debug)]
pub enum BackendReader<'a> {
    InMemory(&'a Graph),
    Persistent(RedbReader),
}

macro_rules! delegate {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match $self {
            Self::InMemory(graph) => graph.$method($($arg),*),
            Self::Persistent(reader) => reader.$method($($arg),*),
        }
    };
}

impl GraphRead for BackendReader<'_> {
    fn entity(&self, id: &EntityId) -> Result<Option<Arc<Entity>>, ProvGraphError> {
        delegate!(self, entity(id))
    }

    fn entities(&self) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        delegate!(self, entities())
    }

    fn entities_of_type(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        delegate!(self, entities_of_type(entity_type))
    }

    fn edge(&self, id: &EdgeId) -> Result<Option<Arc<Edge>>, ProvGraphError> {
        delegate!(self, edge(id))
    }

    fn edges(&self) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        delegate!(self, edges())
    }

    fn outgoing(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        delegate!(self, outgoing(id))
    }

    fn incoming(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        delegate!(self, incoming(id))
    }

    fn entity_count(&self) -> Result<usize, ProvGraphError> {
        delegate!(self, entity_count())
    }

    fn edge_count(&self) -> Result<usize, ProvGraphError> {
        delegate!(self, edge_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        serde_json::from_value(json!({
            "entities": [
                {"id": "d1", "type": "drug", "name": "Aspirin"},
                {"id": "x1", "type": "disease", "name": "Headache"}
            ],
            "edges": [
                {"id": "e1", "source_id": "d1", "target_id": "x1", "relation_type": "treats",
                 "kind": "claim",
                 "evidence": [{"paper_id": "p1", "section_type": "results",
                               "extraction_method": "manual", "confidence": 0.7}]}
            ]
        }))
        .expect("dataset")
    }

    #[test]
    fn both_backends_read_the_same_graph() {
        let weights = WeightTable::default();
        let memory = StorageBackend::in_memory(&dataset(), &weights).expect("memory");

        let dir = TempDir::new().expect("tempdir");
        let mut redb = StorageBackend::redb(dir.path().join("g.redb"), weights).expect("redb");
        redb.import(&dataset(), &weights).expect("import");

        for backend in [&memory, &redb] {
            let reader = backend.begin_read().expect("reader");
            assert_eq!(reader.entity_count().expect("count"), 2);
            let out = reader.outgoing(&"d1".into()).expect("outgoing");
            assert_eq!(out[0].id.as_str(), "e1");
        }
        assert_eq!(memory.label(), "memory");
        assert!(redb.is_persistent());
    }

    #[test]
    fn failed_in_memory_import_leaves_graph_unchanged() {
        let weights = WeightTable::default();
        let mut backend = StorageBackend::in_memory(&dataset(), &weights).expect("memory");
        let mut extra = Dataset::default();
        extra
            .entities
            .push(Entity::new("d2", EntityType::Drug, "Ibuprofen"));
        extra.entities.push(Entity::new("d1", EntityType::Drug, "dup"));
        assert!(backend.import(&extra, &weights).is_err());
        let reader = backend.begin_read().expect("reader");
        assert_eq!(reader.entity_count().expect("count"), 2);
    }
}
