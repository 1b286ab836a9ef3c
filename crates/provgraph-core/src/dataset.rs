//! # Dataset Format
//!
//! The flat JSON document accepted by `import` and by the in-memory store.
//!
//! Edges are written as flat records with a `kind` discriminator. Claim
//! records carry evidence and must not carry a confidence: the engine
//! computes it from the evidence and the configured weight table.

use crate::confidence::WeightTable;
use crate::graph::GraphRead;
use crate::types::{
    ClaimEdge, Edge, EdgeKind, EdgeLayer, EdgeTarget, Entity, Evidence, ExtractionEdge,
    Extractor, Probability, ProvGraphError, RelationType, Strength, SupportEdge,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const fn default_directed() -> bool {
    true
}

/// One edge of any layer, as written in a dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(alias = "id")]
    pub edge_id: String,
    #[serde(alias = "subject_id")]
    pub source_id: String,
    #[serde(alias = "object_id")]
    pub target_id: String,
    #[serde(alias = "predicate")]
    pub relation_type: RelationType,
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(alias = "layer")]
    pub kind: EdgeLayer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<Extractor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Probability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<Strength>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl EdgeRecord {
    /// Build the typed edge, scoring claims with `weights`.
    pub fn into_edge(self, weights: &WeightTable) -> Result<Edge, ProvGraphError> {
        let fault = |why: &str| {
            ProvGraphError::DataIntegrity(format!("edge '{}' {}", self.edge_id, why))
        };

        let kind = match self.kind {
            EdgeLayer::Extraction => {
                let extractor = self
                    .extractor
                    .clone()
                    .ok_or_else(|| fault("is an extraction edge without an extractor"))?;
                let confidence = self
                    .confidence
                    .ok_or_else(|| fault("is an extraction edge without a confidence"))?;
                EdgeKind::Extraction(ExtractionEdge {
                    extractor,
                    confidence,
                })
            }
            EdgeLayer::Claim => {
                if self.confidence.is_some() {
                    return Err(fault(
                        "sets a claim confidence; it is computed from evidence",
                    ));
                }
                if self.evidence.is_empty() {
                    return Err(fault("is a claim without evidence"));
                }
                EdgeKind::Claim(
                    ClaimEdge::new(self.evidence.clone(), weights).map_err(|e| match e {
                        ProvGraphError::DataIntegrity(msg) => fault(&msg),
                        other => other,
                    })?,
                )
            }
            EdgeLayer::Evidence => {
                let supports = self
                    .supports
                    .unwrap_or(self.relation_type != RelationType::Refutes);
                let expected = if supports {
                    RelationType::Supports
                } else {
                    RelationType::Refutes
                };
                if self.relation_type != expected {
                    return Err(fault(&format!(
                        "has relation '{}' but supports={}",
                        self.relation_type, supports
                    )));
                }
                EdgeKind::EvidenceSupport(SupportEdge {
                    supports,
                    strength: self.strength.unwrap_or(Strength::Medium),
                })
            }
        };

        let target = match kind {
            EdgeKind::EvidenceSupport(_) => EdgeTarget::Claim(self.target_id.as_str().into()),
            _ => EdgeTarget::Entity(self.target_id.as_str().into()),
        };

        Ok(Edge {
            id: self.edge_id.as_str().into(),
            source_id: self.source_id.as_str().into(),
            target,
            relation_type: self.relation_type,
            directed: self.directed,
            properties: self.properties,
            kind,
        })
    }
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        let mut record = Self {
            edge_id: edge.id.to_string(),
            source_id: edge.source_id.to_string(),
            target_id: edge.target.as_str().to_string(),
            relation_type: edge.relation_type,
            directed: edge.directed,
            kind: edge.layer(),
            extractor: None,
            confidence: None,
            evidence: Vec::new(),
            supports: None,
            strength: None,
            properties: edge.properties.clone(),
        };
        match &edge.kind {
            EdgeKind::Extraction(x) => {
                record.extractor = Some(x.extractor.clone());
                record.confidence = Some(x.confidence);
            }
            EdgeKind::Claim(c) => record.evidence = c.evidence().to_vec(),
            EdgeKind::EvidenceSupport(s) => {
                record.supports = Some(s.supports);
                record.strength = Some(s.strength);
            }
        }
        record
    }
}

/// Entities and edges of a graph snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default, alias = "nodes")]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

impl Dataset {
    pub fn from_json(text: &str) -> Result<Self, ProvGraphError> {
        serde_json::from_str(text)
            .map_err(|e| ProvGraphError::DataIntegrity(format!("invalid dataset: {}", e)))
    }

    /// Every entity and edge of a snapshot, sorted by id.
    ///
    /// Claim records leave out their confidence, so the result re-imports
    /// under any weight table.
    pub fn snapshot<G: GraphRead>(graph: &G) -> Result<Self, ProvGraphError> {
        Ok(Self {
            entities: graph.entities()?.iter().map(|e| Entity::clone(e)).collect(),
            edges: graph
                .edges()?
                .iter()
                .map(|e| EdgeRecord::from(e.as_ref()))
                .collect(),
        })
    }

    /// Typed edges in load order: entity-targeted layers first, then
    /// evidence-support edges, which reference claims.
    pub fn typed_edges(&self, weights: &WeightTable) -> Result<Vec<Edge>, ProvGraphError> {
        let mut edges = self
            .edges
            .iter()
            .cloned()
            .map(|r| r.into_edge(weights))
            .collect::<Result<Vec<_>, _>>()?;
        edges.sort_by_key(|e| e.layer() == EdgeLayer::Evidence);
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claim_record() -> serde_json::Value {
        json!({
            "edge_id": "c1",
            "source_id": "drug:tamoxifen",
            "target_id": "disease:breast_cancer",
            "relation_type": "treats",
            "kind": "claim",
            "evidence": [
                {"paper_id": "pmid:1", "section_type": "results", "extraction_method": "llm",
                 "confidence": 0.9, "study_type": "rct"},
                {"paper_id": "pmid:2", "section_type": "abstract", "extraction_method": "llm",
                 "confidence": 0.8, "study_type": "cohort"}
            ]
        })
    }

    #[test]
    fn claim_confidence_is_computed() {
        let record: EdgeRecord = serde_json::from_value(claim_record()).expect("record");
        let edge = record.into_edge(&WeightTable::default()).expect("edge");
        let expected = (0.9 * 1.0 + 0.8 * 0.8) / 1.8;
        assert!((edge.confidence().expect("claim") - expected).abs() < 1e-12);
        assert_eq!(edge.evidence_count(), 2);
    }

    #[test]
    fn claim_with_explicit_confidence_is_rejected() {
        let mut value = claim_record();
        value["confidence"] = json!(0.99);
        let record: EdgeRecord = serde_json::from_value(value).expect("record");
        let err = record.into_edge(&WeightTable::default()).expect_err("manual confidence");
        assert!(matches!(err, ProvGraphError::DataIntegrity(_)));
    }

    #[test]
    fn claim_without_evidence_is_rejected() {
        let mut value = claim_record();
        value["evidence"] = json!([]);
        let record: EdgeRecord = serde_json::from_value(value).expect("record");
        assert!(record.into_edge(&WeightTable::default()).is_err());
    }

    #[test]
    fn support_edge_targets_claim() {
        let record: EdgeRecord = serde_json::from_value(json!({
            "id": "s1", "source_id": "ev:1", "target_id": "c1",
            "relation_type": "refutes", "kind": "evidence", "strength": "high"
        }))
        .expect("record");
        let edge = record.into_edge(&WeightTable::default()).expect("edge");
        assert_eq!(edge.target, EdgeTarget::Claim("c1".into()));
        assert!(edge.confidence().is_none());
        assert!(matches!(
            edge.kind,
            EdgeKind::EvidenceSupport(SupportEdge { supports: false, strength: Strength::High })
        ));
    }

    #[test]
    fn record_round_trips_through_edge() {
        let record: EdgeRecord = serde_json::from_value(claim_record()).expect("record");
        let edge = record.clone().into_edge(&WeightTable::default()).expect("edge");
        assert_eq!(EdgeRecord::from(&edge), record);
    }

    #[test]
    fn typed_edges_put_support_last() {
        let dataset: Dataset = serde_json::from_value(json!({
            "entities": [],
            "edges": [
                {"id": "s1", "source_id": "ev:1", "target_id": "c1",
                 "relation_type": "supports", "kind": "evidence"},
                claim_record()
            ]
        }))
        .expect("dataset");
        let edges = dataset.typed_edges(&WeightTable::default()).expect("edges");
        assert_eq!(edges[0].id.as_str(), "c1");
        assert_eq!(edges[1].id.as_str(), "s1");
    }

    #[test]
    fn snapshot_reimports_to_the_same_graph() {
        use crate::graph::Graph;
        let dataset: Dataset = serde_json::from_value(json!({
            "entities": [
                {"id": "disease:breast_cancer", "type": "disease", "name": "Breast Cancer"},
                {"id": "drug:tamoxifen", "type": "drug", "name": "Tamoxifen"}
            ],
            "edges": [claim_record()]
        }))
        .expect("dataset");
        let weights = WeightTable::default();
        let graph = Graph::from_dataset(&dataset, &weights).expect("graph");

        let snapshot = Dataset::snapshot(&graph).expect("snapshot");
        assert_eq!(snapshot, dataset);
        assert!(Graph::from_dataset(&snapshot, &weights).is_ok());
    }
}
