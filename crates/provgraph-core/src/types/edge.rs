//! Tagged edge layers and claim evidence.
//!
//! An [`Edge`] shares one base shape across the extraction, claim and
//! evidence-support layers, with the layer-specific payload carried by
//! [`EdgeKind`]. Only [`ClaimEdge`] exposes evidence, and its confidence can
//! only be produced by the weighting function.

use super::{
    Direction, EdgeId, EdgeLayer, EntityId, ExtractionMethod, Probability, ProvGraphError,
    RelationType, SectionType, Strength, StudyType,
};
use crate::confidence::{WeightTable, weighted_confidence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// EVIDENCE
// =============================================================================

/// Provenance record supporting a claim edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub paper_id: String,
    pub section_type: SectionType,
    #[serde(default)]
    pub paragraph_idx: u32,
    pub extraction_method: ExtractionMethod,
    pub confidence: Probability,
    #[serde(default)]
    pub study_type: Option<StudyType>,
    #[serde(default)]
    pub sample_size: Option<u64>,
}

impl Evidence {
    #[must_use]
    pub fn new(
        paper_id: impl Into<String>,
        section_type: SectionType,
        extraction_method: ExtractionMethod,
        confidence: Probability,
    ) -> Self {
        Self {
            paper_id: paper_id.into(),
            section_type,
            paragraph_idx: 0,
            extraction_method,
            confidence,
            study_type: None,
            sample_size: None,
        }
    }

    #[must_use]
    pub fn with_study_type(mut self, study_type: StudyType) -> Self {
        self.study_type = Some(study_type);
        self
    }

    #[must_use]
    pub fn with_sample_size(mut self, sample_size: u64) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    #[must_use]
    pub fn at_paragraph(mut self, paragraph_idx: u32) -> Self {
        self.paragraph_idx = paragraph_idx;
        self
    }
}

// =============================================================================
// LAYER PAYLOADS
// =============================================================================

/// Model run that produced an extraction edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extractor {
    pub name: String,
    pub version: String,
}

/// Raw model output. Never a medical assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionEdge {
    pub extractor: Extractor,
    pub confidence: Probability,
}

/// Paper-level assertion backed by at least one evidence item.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimEdge {
    evidence: Vec<Evidence>,
    confidence: Probability,
}

impl ClaimEdge {
    /// Build a claim, computing its confidence from the evidence.
    ///
    /// # Errors
    ///
    /// `DataIntegrity` when `evidence` is empty.
    pub fn new(evidence: Vec<Evidence>, weights: &WeightTable) -> Result<Self, ProvGraphError> {
        let confidence = weighted_confidence(&evidence, weights)?;
        Ok(Self {
            evidence,
            confidence,
        })
    }

    #[must_use]
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    #[must_use]
    pub fn confidence(&self) -> Probability {
        self.confidence
    }
}

/// Links an evidence line to a claim, in support or refutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportEdge {
    pub supports: bool,
    pub strength: Strength,
}

/// Layer-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    Extraction(ExtractionEdge),
    Claim(ClaimEdge),
    EvidenceSupport(SupportEdge),
}

// =============================================================================
// EDGE
// =============================================================================

/// What an edge points at. Evidence-support edges target a claim edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeTarget {
    Entity(EntityId),
    Claim(EdgeId),
}

impl EdgeTarget {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Entity(id) => id.as_str(),
            Self::Claim(id) => id.as_str(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> Option<&EntityId> {
        match self {
            Self::Entity(id) => Some(id),
            Self::Claim(_) => None,
        }
    }
}

/// A typed edge of one of the three layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: EntityId,
    pub target: EdgeTarget,
    pub relation_type: RelationType,
    pub directed: bool,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub kind: EdgeKind,
}

impl Edge {
    fn base(
        id: impl Into<String>,
        source: impl Into<String>,
        target: EdgeTarget,
        relation_type: RelationType,
        kind: EdgeKind,
    ) -> Self {
        Self {
            id: EdgeId::new(id),
            source_id: EntityId::new(source),
            target,
            relation_type,
            directed: true,
            properties: BTreeMap::new(),
            kind,
        }
    }

    #[must_use]
    pub fn extraction(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: RelationType,
        payload: ExtractionEdge,
    ) -> Self {
        Self::base(
            id,
            source,
            EdgeTarget::Entity(EntityId::new(target)),
            relation_type,
            EdgeKind::Extraction(payload),
        )
    }

    #[must_use]
    pub fn claim(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: RelationType,
        payload: ClaimEdge,
    ) -> Self {
        Self::base(
            id,
            source,
            EdgeTarget::Entity(EntityId::new(target)),
            relation_type,
            EdgeKind::Claim(payload),
        )
    }

    /// Evidence-support edge from an evidence line entity to a claim edge.
    #[must_use]
    pub fn evidence_support(
        id: impl Into<String>,
        evidence_line: impl Into<String>,
        claim: impl Into<String>,
        payload: SupportEdge,
    ) -> Self {
        let relation = if payload.supports {
            RelationType::Supports
        } else {
            RelationType::Refutes
        };
        Self::base(
            id,
            evidence_line,
            EdgeTarget::Claim(EdgeId::new(claim)),
            relation,
            EdgeKind::EvidenceSupport(payload),
        )
    }

    #[must_use]
    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub const fn layer(&self) -> EdgeLayer {
        match self.kind {
            EdgeKind::Extraction(_) => EdgeLayer::Extraction,
            EdgeKind::Claim(_) => EdgeLayer::Claim,
            EdgeKind::EvidenceSupport(_) => EdgeLayer::Evidence,
        }
    }

    /// Aggregate (claim) or raw (extraction) confidence. Support edges have none.
    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        match &self.kind {
            EdgeKind::Extraction(e) => Some(e.confidence.value()),
            EdgeKind::Claim(c) => Some(c.confidence().value()),
            EdgeKind::EvidenceSupport(_) => None,
        }
    }

    #[must_use]
    pub fn as_claim(&self) -> Option<&ClaimEdge> {
        match &self.kind {
            EdgeKind::Claim(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn evidence_count(&self) -> usize {
        self.as_claim().map_or(0, |c| c.evidence().len())
    }

    #[must_use]
    pub fn target_entity(&self) -> Option<&EntityId> {
        self.target.entity()
    }

    /// The endpoint reached when leaving `node` in `direction`.
    ///
    /// Undirected edges can be followed either way regardless of `direction`.
    #[must_use]
    pub fn other_endpoint(&self, node: &EntityId, direction: Direction) -> Option<&EntityId> {
        let target = self.target.entity()?;
        let forward = &self.source_id == node;
        let backward = target == node;
        match direction {
            Direction::Outgoing if forward => Some(target),
            Direction::Outgoing if !self.directed && backward => Some(&self.source_id),
            Direction::Incoming if backward => Some(&self.source_id),
            Direction::Incoming if !self.directed && forward => Some(target),
            Direction::Both if forward => Some(target),
            Direction::Both if backward => Some(&self.source_id),
            _ => None,
        }
    }
}
