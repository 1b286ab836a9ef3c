//! # redb-backed Graph Storage
//!
//! A disk-backed graph store using the redb embedded database, providing:
//! - ACID transactions (an import commits entirely or not at all)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (each query reads one snapshot while imports proceed)
//!
//! Records are postcard-encoded. Claim confidence is never stored: it is
//! recomputed from the stored evidence with the store's weight table on
//! every read.

use crate::confidence::WeightTable;
use crate::dataset::{Dataset, EdgeRecord};
use crate::graph::{GraphRead, GraphStore};
use crate::types::{
    Edge, EdgeId, EdgeLayer, Entity, EntityId, EntityType, Evidence, Extractor, Probability,
    ProvGraphError, RelationType, Strength,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Table for entities: entity id -> postcard `StoredEntity`
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// Table for edges of every layer: edge id -> postcard `StoredEdge`
const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");

/// Adjacency: (source entity, edge id)
const OUTGOING: TableDefinition<(&str, &str), ()> = TableDefinition::new("outgoing");

/// Reverse adjacency: (target entity, edge id)
const INCOMING: TableDefinition<(&str, &str), ()> = TableDefinition::new("incoming");

/// Type index: (entity type, entity id)
const TYPES: TableDefinition<(&str, &str), ()> = TableDefinition::new("types");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const FORMAT_VERSION: u64 = 2;

// =============================================================================
// STORED RECORDS
// =============================================================================

/// Property bags are kept as JSON text; postcard cannot encode schemaless values.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntity {
    id: String,
    entity_type: EntityType,
    name: String,
    external_ids: BTreeMap<String, String>,
    synonyms: BTreeSet<String>,
    properties_json: String,
    embedding: Option<Vec<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEdge {
    edge_id: String,
    source_id: String,
    target_id: String,
    relation_type: RelationType,
    directed: bool,
    kind: EdgeLayer,
    extractor: Option<Extractor>,
    confidence: Option<Probability>,
    evidence: Vec<Evidence>,
    supports: Option<bool>,
    strength: Option<Strength>,
    properties_json: String,
}

fn encode_json(
    props: &BTreeMap<String, serde_json::Value>,
) -> Result<String, ProvGraphError> {
    serde_json::to_string(props).map_err(|e| ProvGraphError::Io(e.to_string()))
}

fn decode_json(id: &str, text: &str) -> Result<BTreeMap<String, serde_json::Value>, ProvGraphError> {
    serde_json::from_str(text).map_err(|e| {
        ProvGraphError::DataIntegrity(format!("record '{}' has undecodable properties: {}", id, e))
    })
}

fn encode_entity(entity: &Entity) -> Result<Vec<u8>, ProvGraphError> {
    let stored = StoredEntity {
        id: entity.id.to_string(),
        entity_type: entity.entity_type,
        name: entity.name.clone(),
        external_ids: entity.external_ids.clone(),
        synonyms: entity.synonyms.clone(),
        properties_json: encode_json(&entity.properties)?,
        embedding: entity.embedding.clone(),
    };
    postcard::to_allocvec(&stored).map_err(|e| ProvGraphError::Io(e.to_string()))
}

fn decode_entity(id: &str, bytes: &[u8]) -> Result<Entity, ProvGraphError> {
    let stored: StoredEntity = postcard::from_bytes(bytes).map_err(|e| {
        ProvGraphError::DataIntegrity(format!("entity '{}' is undecodable: {}", id, e))
    })?;
    Ok(Entity {
        properties: decode_json(id, &stored.properties_json)?,
        id: EntityId::new(stored.id),
        entity_type: stored.entity_type,
        name: stored.name,
        external_ids: stored.external_ids,
        synonyms: stored.synonyms,
        embedding: stored.embedding,
    })
}

fn encode_edge(edge: &Edge) -> Result<Vec<u8>, ProvGraphError> {
    let record = EdgeRecord::from(edge);
    let stored = StoredEdge {
        properties_json: encode_json(&record.properties)?,
        edge_id: record.edge_id,
        source_id: record.source_id,
        target_id: record.target_id,
        relation_type: record.relation_type,
        directed: record.directed,
        kind: record.kind,
        extractor: record.extractor,
        // Claims are rescored on read.
        confidence: if record.kind == EdgeLayer::Claim {
            None
        } else {
            record.confidence
        },
        evidence: record.evidence,
        supports: record.supports,
        strength: record.strength,
    };
    postcard::to_allocvec(&stored).map_err(|e| ProvGraphError::Io(e.to_string()))
}

fn decode_edge(id: &str, bytes: &[u8], weights: &WeightTable) -> Result<Edge, ProvGraphError> {
    let stored: StoredEdge = postcard::from_bytes(bytes).map_err(|e| {
        ProvGraphError::DataIntegrity(format!("edge '{}' is undecodable: {}", id, e))
    })?;
    let record = EdgeRecord {
        properties: decode_json(id, &stored.properties_json)?,
        edge_id: stored.edge_id,
        source_id: stored.source_id,
        target_id: stored.target_id,
        relation_type: stored.relation_type,
        directed: stored.directed,
        kind: stored.kind,
        extractor: stored.extractor,
        confidence: stored.confidence,
        evidence: stored.evidence,
        supports: stored.supports,
        strength: stored.strength,
    };
    record.into_edge(weights).inspect_err(|e| {
        tracing::warn!(edge = id, error = %e, "stored edge violates model invariants");
    })
}

// =============================================================================
// STORE
// =============================================================================

/// Counts written by one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub entities: usize,
    pub edges: usize,
}

/// A disk-backed graph store using redb.
pub struct RedbGraph {
    db: Database,
    weights: WeightTable,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>, weights: WeightTable) -> Result<Self, ProvGraphError> {
        let db = Database::create(path.as_ref()).map_err(|e| ProvGraphError::Io(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(ProvGraphError::store)?;
            let _ = write_txn.open_table(ENTITIES).map_err(ProvGraphError::store)?;
            let _ = write_txn.open_table(EDGES).map_err(ProvGraphError::store)?;
            let _ = write_txn.open_table(OUTGOING).map_err(ProvGraphError::store)?;
            let _ = write_txn.open_table(INCOMING).map_err(ProvGraphError::store)?;
            let _ = write_txn.open_table(TYPES).map_err(ProvGraphError::store)?;
            {
                let mut meta = write_txn.open_table(METADATA).map_err(ProvGraphError::store)?;
                let version = meta
                    .get("format_version")
                    .map_err(ProvGraphError::store)?
                    .map(|v| v.value());
                match version {
                    None => {
                        meta.insert("format_version", FORMAT_VERSION)
                            .map_err(ProvGraphError::store)?;
                    }
                    Some(FORMAT_VERSION) => {}
                    Some(other) => {
                        return Err(ProvGraphError::DataIntegrity(format!(
                            "database format version {} is not supported (expected {})",
                            other, FORMAT_VERSION
                        )));
                    }
                }
            }
            write_txn.commit().map_err(ProvGraphError::store)?;
        }

        Ok(Self { db, weights })
    }

    #[must_use]
    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Write a dataset in one transaction.
    ///
    /// Ids must not collide with stored records and every endpoint must
    /// resolve, either within the dataset or in the store. On any fault
    /// nothing is written.
    pub fn import(&self, dataset: &Dataset) -> Result<ImportSummary, ProvGraphError> {
        let edges = dataset.typed_edges(&self.weights)?;
        let write_txn = self.db.begin_write().map_err(ProvGraphError::store)?;
        {
            let mut entities = write_txn.open_table(ENTITIES).map_err(ProvGraphError::store)?;
            let mut edge_table = write_txn.open_table(EDGES).map_err(ProvGraphError::store)?;
            let mut outgoing = write_txn.open_table(OUTGOING).map_err(ProvGraphError::store)?;
            let mut incoming = write_txn.open_table(INCOMING).map_err(ProvGraphError::store)?;
            let mut types = write_txn.open_table(TYPES).map_err(ProvGraphError::store)?;

            for entity in &dataset.entities {
                entity.check_embedding()?;
                let id = entity.id.as_str();
                if entities.get(id).map_err(ProvGraphError::store)?.is_some() {
                    return Err(ProvGraphError::DataIntegrity(format!(
                        "duplicate entity id '{}'",
                        id
                    )));
                }
                entities
                    .insert(id, encode_entity(entity)?.as_slice())
                    .map_err(ProvGraphError::store)?;
                types
                    .insert((entity.entity_type.as_str(), id), ())
                    .map_err(ProvGraphError::store)?;
            }

            for edge in &edges {
                let id = edge.id.as_str();
                if edge_table.get(id).map_err(ProvGraphError::store)?.is_some() {
                    return Err(ProvGraphError::DataIntegrity(format!(
                        "duplicate edge id '{}'",
                        id
                    )));
                }

                let source = match entities
                    .get(edge.source_id.as_str())
                    .map_err(ProvGraphError::store)?
                {
                    Some(guard) => decode_entity(edge.source_id.as_str(), guard.value())?,
                    None => {
                        return Err(ProvGraphError::DataIntegrity(format!(
                            "edge '{}' references missing source entity '{}'",
                            id, edge.source_id
                        )));
                    }
                };

                match edge.target_entity() {
                    Some(target) => {
                        if entities
                            .get(target.as_str())
                            .map_err(ProvGraphError::store)?
                            .is_none()
                        {
                            return Err(ProvGraphError::DataIntegrity(format!(
                                "edge '{}' references missing target entity '{}'",
                                id, target
                            )));
                        }
                        incoming
                            .insert((target.as_str(), id), ())
                            .map_err(ProvGraphError::store)?;
                    }
                    None => {
                        let claim_id = edge.target.as_str();
                        let layer = match edge_table.get(claim_id).map_err(ProvGraphError::store)? {
                            Some(guard) => Some(decode_edge(claim_id, guard.value(), &self.weights)?.layer()),
                            None => None,
                        };
                        if layer != Some(EdgeLayer::Claim)
                            || source.entity_type != EntityType::EvidenceLine
                        {
                            return Err(ProvGraphError::DataIntegrity(format!(
                                "evidence-support edge '{}' must link an evidence_line to a claim edge",
                                id
                            )));
                        }
                    }
                }

                edge_table
                    .insert(id, encode_edge(edge)?.as_slice())
                    .map_err(ProvGraphError::store)?;
                outgoing
                    .insert((edge.source_id.as_str(), id), ())
                    .map_err(ProvGraphError::store)?;
            }
        }
        write_txn.commit().map_err(ProvGraphError::store)?;

        let summary = ImportSummary {
            entities: dataset.entities.len(),
            edges: edges.len(),
        };
        tracing::info!(
            entities = summary.entities,
            edges = summary.edges,
            "dataset imported"
        );
        Ok(summary)
    }
}

impl GraphStore for RedbGraph {
    type Reader<'a> = RedbReader;

    fn begin_read(&self) -> Result<Self::Reader<'_>, ProvGraphError> {
        let txn = self.db.begin_read().map_err(ProvGraphError::store)?;
        Ok(RedbReader {
            txn,
            weights: self.weights,
        })
    }
}

// =============================================================================
// SNAPSHOT READER
// =============================================================================

/// One MVCC snapshot of a [`RedbGraph`].
pub struct RedbReader {
    txn: ReadTransaction,
    weights: WeightTable,
}

impl std::fmt::Debug for RedbReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbReader").finish_non_exhaustive()
    }
}

impl RedbReader {
    /// Ids in an index range `(prefix, *)`, in key order.
    fn index_range(
        &self,
        table: TableDefinition<(&str, &str), ()>,
        prefix: &str,
    ) -> Result<Vec<String>, ProvGraphError> {
        let table = self.txn.open_table(table).map_err(ProvGraphError::store)?;
        let mut ids = Vec::new();
        for entry in table.range((prefix, "")..).map_err(ProvGraphError::store)? {
            let (key, _) = entry.map_err(ProvGraphError::store)?;
            let (head, id) = key.value();
            if head != prefix {
                break;
            }
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    fn entities_by_id(&self, ids: &[String]) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        let table = self.txn.open_table(ENTITIES).map_err(ProvGraphError::store)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let guard = table.get(id.as_str()).map_err(ProvGraphError::store)?.ok_or_else(|| {
                ProvGraphError::DataIntegrity(format!("index references missing entity '{}'", id))
            })?;
            out.push(Arc::new(decode_entity(id, guard.value())?));
        }
        Ok(out)
    }

    fn edges_by_id(&self, ids: &[String]) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        let table = self.txn.open_table(EDGES).map_err(ProvGraphError::store)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let guard = table.get(id.as_str()).map_err(ProvGraphError::store)?.ok_or_else(|| {
                ProvGraphError::DataIntegrity(format!("index references missing edge '{}'", id))
            })?;
            out.push(Arc::new(decode_edge(id, guard.value(), &self.weights)?));
        }
        Ok(out)
    }
}

impl GraphRead for RedbReader {
    fn entity(&self, id: &EntityId) -> Result<Option<Arc<Entity>>, ProvGraphError> {
        let table = self.txn.open_table(ENTITIES).map_err(ProvGraphError::store)?;
        match table.get(id.as_str()).map_err(ProvGraphError::store)? {
            Some(guard) => Ok(Some(Arc::new(decode_entity(id.as_str(), guard.value())?))),
            None => Ok(None),
        }
    }

    fn entities(&self) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        let table = self.txn.open_table(ENTITIES).map_err(ProvGraphError::store)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(ProvGraphError::store)? {
            let (key, value) = entry.map_err(ProvGraphError::store)?;
            out.push(Arc::new(decode_entity(key.value(), value.value())?));
        }
        Ok(out)
    }

    fn entities_of_type(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<Arc<Entity>>, ProvGraphError> {
        let ids = self.index_range(TYPES, entity_type.as_str())?;
        self.entities_by_id(&ids)
    }

    fn edge(&self, id: &EdgeId) -> Result<Option<Arc<Edge>>, ProvGraphError> {
        let table = self.txn.open_table(EDGES).map_err(ProvGraphError::store)?;
        match table.get(id.as_str()).map_err(ProvGraphError::store)? {
            Some(guard) => Ok(Some(Arc::new(decode_edge(
                id.as_str(),
                guard.value(),
                &self.weights,
            )?))),
            None => Ok(None),
        }
    }

    fn edges(&self) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        let table = self.txn.open_table(EDGES).map_err(ProvGraphError::store)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(ProvGraphError::store)? {
            let (key, value) = entry.map_err(ProvGraphError::store)?;
            out.push(Arc::new(decode_edge(key.value(), value.value(), &self.weights)?));
        }
        Ok(out)
    }

    fn outgoing(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        let ids = self.index_range(OUTGOING, id.as_str())?;
        self.edges_by_id(&ids)
    }

    fn incoming(&self, id: &EntityId) -> Result<Vec<Arc<Edge>>, ProvGraphError> {
        let ids = self.index_range(INCOMING, id.as_str())?;
        self.edges_by_id(&ids)
    }

    fn entity_count(&self) -> Result<usize, ProvGraphError> {
        let table = self.txn.open_table(ENTITIES).map_err(ProvGraphError::store)?;
        let len = table.len().map_err(ProvGraphError::store)?;
        Ok(len as usize)
    }

    fn edge_count(&self) -> Result<usize, ProvGraphError> {
        let table = self.txn.open_table(EDGES).map_err(ProvGraphError::store)?;
        let len = table.len().map_err(ProvGraphError::store)?;
        Ok(len as usize)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        serde_json::from_value(json!({
            "entities": [
                {"id": "drug:tamoxifen", "type": "drug", "name": "Tamoxifen",
                 "external_ids": {"RxNorm": "10324"}, "properties": {"class": "SERM"},
                 "embedding": [0.25, -0.5]},
                {"id": "disease:bc", "type": "disease", "name": "Breast Cancer"},
                {"id": "ev:1", "type": "evidence_line", "name": "EL-1"}
            ],
            "edges": [
                {"edge_id": "c1", "source_id": "drug:tamoxifen", "target_id": "disease:bc",
                 "relation_type": "treats", "kind": "claim",
                 "evidence": [
                    {"paper_id": "pmid:1", "section_type": "results", "extraction_method": "llm",
                     "confidence": 0.85, "study_type": "rct"},
                    {"paper_id": "pmid:2", "section_type": "results", "extraction_method": "llm",
                     "confidence": 0.93, "study_type": "rct"}
                 ]},
                {"edge_id": "s1", "source_id": "ev:1", "target_id": "c1",
                 "relation_type": "supports", "kind": "evidence", "strength": "high"}
            ]
        }))
        .expect("dataset")
    }

    fn open(dir: &TempDir) -> RedbGraph {
        RedbGraph::open(dir.path().join("graph.redb"), WeightTable::default()).expect("open")
    }

    #[test]
    fn import_and_read_back() {
        let dir = TempDir::new().expect("tempdir");
        let graph = open(&dir);
        let summary = graph.import(&dataset()).expect("import");
        assert_eq!(summary, ImportSummary { entities: 3, edges: 2 });

        let reader = graph.begin_read().expect("reader");
        assert_eq!(reader.entity_count().expect("count"), 3);
        assert_eq!(reader.edge_count().expect("count"), 2);

        let drug = reader
            .entity(&"drug:tamoxifen".into())
            .expect("lookup")
            .expect("present");
        assert_eq!(drug.properties.get("class"), Some(&json!("SERM")));
        assert_eq!(drug.embedding, Some(vec![0.25, -0.5]));

        let out = reader.outgoing(&"drug:tamoxifen".into()).expect("outgoing");
        assert_eq!(out.len(), 1);
        let confidence = out[0].confidence().expect("claim confidence");
        assert!((confidence - 0.89).abs() < 1e-9);

        let incoming = reader.incoming(&"disease:bc".into()).expect("incoming");
        assert_eq!(incoming[0].id.as_str(), "c1");
        let drugs = reader.entities_of_type(EntityType::Drug).expect("type index");
        assert_eq!(drugs.len(), 1);
    }

    #[test]
    fn claim_confidence_follows_weight_table() {
        let dir = TempDir::new().expect("tempdir");
        {
            let graph = open(&dir);
            graph.import(&dataset()).expect("import");
        }
        let weights = WeightTable {
            rct: 2.0,
            ..WeightTable::default()
        };
        let graph = RedbGraph::open(dir.path().join("graph.redb"), weights).expect("reopen");
        let reader = graph.begin_read().expect("reader");
        let edge = reader.edge(&"c1".into()).expect("lookup").expect("present");
        // Both items share a study type, so the weighting cancels out.
        assert!((edge.confidence().expect("claim") - 0.89).abs() < 1e-9);
    }

    #[test]
    fn failed_import_writes_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let graph = open(&dir);
        let mut bad = dataset();
        bad.edges[0].target_id = "disease:missing".to_string();
        assert!(matches!(
            graph.import(&bad),
            Err(ProvGraphError::DataIntegrity(_))
        ));
        let reader = graph.begin_read().expect("reader");
        assert_eq!(reader.entity_count().expect("count"), 0);
    }

    #[test]
    fn reimport_collides() {
        let dir = TempDir::new().expect("tempdir");
        let graph = open(&dir);
        graph.import(&dataset()).expect("import");
        assert!(graph.import(&dataset()).is_err());
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let graph = open(&dir);
            graph.import(&dataset()).expect("import");
        }
        let graph = open(&dir);
        let reader = graph.begin_read().expect("reader");
        let edges = reader.edges().expect("edges");
        let ids: Vec<&str> = edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "s1"]);
    }
}
