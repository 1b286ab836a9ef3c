//! # Core Type Definitions
//!
//! This module contains the graph data model shared by every stage of the engine:
//! - Identifiers (`EntityId`, `EdgeId`) and bounded scores (`Probability`)
//! - Closed vocabularies (`EntityType`, `RelationType`, `StudyType`, ...)
//! - Entities, evidence and the tagged `Edge` variant
//! - The error taxonomy (`ProvGraphError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier and vocabulary types implement `Ord` so they can key
//! `BTreeMap`/`BTreeSet` indexes and provide the id tie-break used by ordering.

mod edge;
mod entity;

pub use edge::{
    ClaimEdge, Edge, EdgeKind, EdgeTarget, Evidence, ExtractionEdge, Extractor, SupportEdge,
};
pub use entity::Entity;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// CLOSED VOCABULARY MACRO
// =============================================================================

/// Declare a closed, case-insensitive vocabulary enum.
///
/// Generated enums serialize as their lowercase label, parse through `FromStr`
/// (accepting the listed aliases) and reject anything else with a
/// `ProvGraphError::Validation` listing the allowed labels.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every member of the vocabulary, in declaration order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            /// Canonical lowercase label.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Canonical labels of every member.
            #[must_use]
            pub fn labels() -> Vec<String> {
                Self::ALL.iter().map(|v| v.as_str().to_string()).collect()
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::types::ProvGraphError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    $( $text $(| $alias)* => Ok($name::$variant), )+
                    _ => Err($crate::types::ProvGraphError::Validation {
                        message: format!("Unknown {} '{}'", $label, s),
                        field: None,
                        allowed: Self::labels(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::types::ProvGraphError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use closed_enum;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Canonical entity identifier assigned by the external resolution process.
///
/// Opaque to the engine: it is only ever compared and used as a join key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Edge identifier, unique across all three edge layers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// PROBABILITY
// =============================================================================

/// A confidence value guaranteed to lie in `[0.0, 1.0]`.
///
/// Construction and deserialization both reject non-finite or out-of-range input.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Probability(f64);

impl Probability {
    /// Certain (1.0).
    pub const ONE: Self = Self(1.0);

    /// Validate a raw score.
    pub fn new(value: f64) -> Result<Self, ProvGraphError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ProvGraphError::DataIntegrity(format!(
                "confidence {} is not a probability in [0, 1]",
                value
            )))
        }
    }

    /// Clamp a computed score into range. NaN collapses to 0.
    #[must_use]
    pub(crate) fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Probability {
    type Error = ProvGraphError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Probability> for f64 {
    fn from(value: Probability) -> Self {
        value.0
    }
}

// =============================================================================
// CLOSED VOCABULARIES
// =============================================================================

closed_enum! {
    /// Entity type. Closed: unknown types are rejected at validation time.
    EntityType, "entity type" {
        Disease => "disease",
        Symptom => "symptom",
        Drug => "drug",
        Gene => "gene",
        Mutation => "mutation",
        Protein => "protein",
        Pathway => "pathway",
        AnatomicalStructure => "anatomical_structure",
        Procedure => "procedure",
        Test => "test",
        Biomarker => "biomarker",
        Paper => "paper",
        Author => "author",
        Institution => "institution",
        ClinicalTrial => "clinical_trial",
        EvidenceLine => "evidence_line",
    }
}

closed_enum! {
    /// Relation type carried by every edge layer.
    RelationType, "relation type" {
        // Clinical
        Causes => "causes",
        Prevents => "prevents",
        IncreasesRisk => "increases_risk",
        DecreasesRisk => "decreases_risk",
        Treats => "treats",
        Manages => "manages",
        Contraindicates => "contraindicates",
        // Molecular
        BindsTo => "binds_to",
        Inhibits => "inhibits",
        Activates => "activates",
        Upregulates => "upregulates",
        Downregulates => "downregulates",
        Encodes => "encodes",
        // Diagnostic
        Diagnoses => "diagnoses",
        Indicates => "indicates",
        DiagnosedBy => "diagnosed_by",
        // Course / observation
        AssociatedWith => "associated_with",
        CorrelatesWith => "correlates_with",
        ProgressesTo => "progresses_to",
        DetectedIn => "detected_in",
        IsolatedFrom => "isolated_from",
        Infects => "infects",
        ReplicatesIn => "replicates_in",
        // Literature
        Cites => "cites",
        Mentions => "mentions",
        CoOccursWith => "co_occurs_with" | "co_occurrence",
        // Evidence layer
        Supports => "supports",
        Refutes => "refutes",
    }
}

closed_enum! {
    /// Paper section an evidence item was read from.
    SectionType, "section type" {
        Abstract => "abstract",
        Introduction => "introduction" | "intro",
        Methods => "methods",
        Results => "results",
        Discussion => "discussion",
        Conclusion => "conclusion" | "conclusions",
    }
}

closed_enum! {
    /// How an evidence item was produced.
    ExtractionMethod, "extraction method" {
        ScispacyNer => "scispacy_ner",
        Llm => "llm",
        TableParser => "table_parser",
        PatternMatch => "pattern_match",
        Manual => "manual",
    }
}

closed_enum! {
    /// Study design of the paper behind an evidence item.
    StudyType, "study type" {
        Rct => "rct",
        MetaAnalysis => "meta_analysis",
        Cohort => "cohort",
        CaseControl => "case_control",
        Observational => "observational",
        Review => "review",
        CaseReport => "case_report",
    }
}

closed_enum! {
    /// Strength of an evidence-support link.
    Strength, "strength" {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

closed_enum! {
    /// The three edge layers. Patterns always target exactly one.
    EdgeLayer, "edge layer" {
        Extraction => "extraction",
        Claim => "claim",
        Evidence => "evidence" | "evidence_support",
    }
}

closed_enum! {
    /// Traversal direction relative to the anchoring node.
    Direction, "direction" {
        Outgoing => "outgoing" | "out",
        Incoming => "incoming" | "in",
        Both => "both",
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Execution-time faults. Never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Query exceeded its deadline")]
    Timeout,

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Traversal budget exhausted after {0} path states")]
    BudgetExhausted(usize),
}

impl ExecutionFault {
    /// Machine-readable reason for wire error details.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::BudgetExhausted(_) => "budget_exhausted",
        }
    }
}

/// Errors that can occur while validating or executing a query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvGraphError {
    /// The query is malformed. Always raised before store access.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        allowed: Vec<String>,
    },

    /// A valid query shape this engine does not execute.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionFault),

    /// Stored data violates a model invariant.
    #[error("Data integrity fault: {0}")]
    DataIntegrity(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ProvGraphError {
    /// Validation error without field details.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
            allowed: Vec::new(),
        }
    }

    /// Validation error naming the offending field and the accepted alternatives.
    pub fn invalid_field(field: impl Into<String>, allowed: Vec<String>) -> Self {
        let field = field.into();
        Self::Validation {
            message: format!("Unknown field '{}'", field),
            field: Some(field),
            allowed,
        }
    }

    /// Attach a field name to a validation error that has none yet.
    #[must_use]
    pub fn at_field(self, name: &str) -> Self {
        match self {
            Self::Validation {
                message,
                field: None,
                allowed,
            } => Self::Validation {
                message,
                field: Some(name.to_string()),
                allowed,
            },
            other => other,
        }
    }

    /// Map a backing-store error.
    pub fn store(err: impl fmt::Display) -> Self {
        Self::Execution(ExecutionFault::StoreUnavailable(err.to_string()))
    }

    /// Wire error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::UnsupportedFeature(_) => "UNSUPPORTED_FEATURE",
            Self::Execution(_) => "EXECUTION_ERROR",
            Self::DataIntegrity(_) => "DATA_INTEGRITY_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_rejects_out_of_range() {
        assert!(Probability::new(0.0).is_ok());
        assert!(Probability::new(1.0).is_ok());
        assert!(matches!(
            Probability::new(1.01),
            Err(ProvGraphError::DataIntegrity(_))
        ));
        assert!(Probability::new(-0.1).is_err());
        assert!(Probability::new(f64::NAN).is_err());
    }

    #[test]
    fn probability_deserialization_is_checked() {
        let ok: Probability = serde_json::from_str("0.5").expect("valid");
        assert_eq!(ok.value(), 0.5);
        assert!(serde_json::from_str::<Probability>("1.5").is_err());
    }

    #[test]
    fn vocabulary_parsing_is_case_insensitive() {
        assert_eq!("DRUG".parse::<EntityType>().ok(), Some(EntityType::Drug));
        assert_eq!(
            "Treats".parse::<RelationType>().ok(),
            Some(RelationType::Treats)
        );
        assert_eq!(
            "intro".parse::<SectionType>().ok(),
            Some(SectionType::Introduction)
        );
    }

    #[test]
    fn unknown_vocabulary_lists_allowed_labels() {
        let err = "spaceship".parse::<EntityType>().expect_err("unknown");
        assert!(matches!(
            err,
            ProvGraphError::Validation { ref allowed, .. }
                if allowed.contains(&"drug".to_string()) && allowed.len() == EntityType::ALL.len()
        ));
    }

    #[test]
    fn vocabulary_serializes_as_label() {
        let json = serde_json::to_string(&StudyType::MetaAnalysis).expect("serialize");
        assert_eq!(json, "\"meta_analysis\"");
        let parsed: StudyType = serde_json::from_str("\"RCT\"").expect("parse");
        assert_eq!(parsed, StudyType::Rct);
    }

    #[test]
    fn at_field_only_fills_missing_field() {
        let err = ProvGraphError::validation("bad").at_field("node_pattern.type");
        assert!(matches!(
            err,
            ProvGraphError::Validation { field: Some(ref f), .. } if f == "node_pattern.type"
        ));
        let named = ProvGraphError::invalid_field("a", vec![]).at_field("b");
        assert!(matches!(
            named,
            ProvGraphError::Validation { field: Some(ref f), .. } if f == "a"
        ));
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            ProvGraphError::validation("x").code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ProvGraphError::UnsupportedFeature("subgraph".into()).code(),
            "UNSUPPORTED_FEATURE"
        );
        assert_eq!(
            ProvGraphError::from(ExecutionFault::Timeout).code(),
            "EXECUTION_ERROR"
        );
        assert_eq!(
            ProvGraphError::DataIntegrity("x".into()).code(),
            "DATA_INTEGRITY_ERROR"
        );
    }
}
