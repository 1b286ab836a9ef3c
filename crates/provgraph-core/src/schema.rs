//! # Schema Registry
//!
//! The static description of everything a query may name: the keys each
//! pattern object accepts, the fields of nodes, edges, evidence items and
//! paths, and the closed vocabularies behind them.
//!
//! The registry never changes while an engine runs. It drives two things:
//! - rejection of unknown keys and fields, with the allowed alternatives
//! - the `/schema` document served by the app

use crate::query::{AggFunc, FindType, Operator};
use crate::types::{
    Direction, EdgeLayer, EntityType, ExtractionMethod, RelationType, SectionType, Strength,
    StudyType,
};
use serde_json::json;

// =============================================================================
// PATTERN OBJECTS
// =============================================================================

/// A JSON object kind accepted by the query parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternObject {
    Query,
    NodePattern,
    VectorSearch,
    EdgePattern,
    PathPattern,
    PathStep,
    Filter,
    Aggregate,
    Aggregation,
    OrderBy,
}

impl PatternObject {
    /// Keys accepted on this object, aliases included.
    #[must_use]
    pub const fn keys(self) -> &'static [&'static str] {
        match self {
            Self::Query => &[
                "find",
                "node_pattern",
                "edge_pattern",
                "path_pattern",
                "filters",
                "aggregate",
                "order_by",
                "limit",
                "offset",
                "return_fields",
            ],
            Self::NodePattern => &[
                "type",
                "types",
                "node_type",
                "node_types",
                "id",
                "name",
                "name_pattern",
                "external_ids",
                "properties",
                "property_filters",
                "vector_search",
                "var",
            ],
            Self::VectorSearch => &[
                "embedding",
                "vector",
                "top_k",
                "min_similarity",
                "similarity_threshold",
                "text",
            ],
            Self::EdgePattern => &[
                "relation_type",
                "relation_types",
                "direction",
                "layer",
                "min_confidence",
                "property_filters",
                "min_evidence_count",
                "require_evidence_from",
                "var",
            ],
            Self::PathPattern => &[
                "start",
                "steps",
                "edges",
                "end",
                "max_hops",
                "avoid_cycles",
                "shortest_path",
                "all_paths",
            ],
            Self::PathStep => &["edge", "node"],
            Self::Filter => &["field", "operator", "op", "value"],
            Self::Aggregate => &["group_by", "aggregations"],
            Self::Aggregation => &["function", "field"],
            Self::OrderBy => &["field", "direction"],
        }
    }

    /// Keys as owned strings, for error details.
    #[must_use]
    pub fn allowed(self) -> Vec<String> {
        self.keys().iter().map(|k| (*k).to_string()).collect()
    }
}

// =============================================================================
// FIELDS
// =============================================================================

/// Closed vocabulary a text field draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    EntityType,
    RelationType,
    EdgeLayer,
    SectionType,
    ExtractionMethod,
    StudyType,
    Strength,
}

impl Vocabulary {
    /// Check that `value` is a member, returning the canonical label.
    pub fn canonicalize(self, value: &str) -> Result<&'static str, crate::types::ProvGraphError> {
        Ok(match self {
            Self::EntityType => value.parse::<EntityType>()?.as_str(),
            Self::RelationType => value.parse::<RelationType>()?.as_str(),
            Self::EdgeLayer => value.parse::<EdgeLayer>()?.as_str(),
            Self::SectionType => value.parse::<SectionType>()?.as_str(),
            Self::ExtractionMethod => value.parse::<ExtractionMethod>()?.as_str(),
            Self::StudyType => value.parse::<StudyType>()?.as_str(),
            Self::Strength => value.parse::<Strength>()?.as_str(),
        })
    }
}

/// Scalar type of a field, used to type-check filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    /// Text drawn from a closed vocabulary.
    Enum(Vocabulary),
    Number,
    Bool,
    /// Nested object (a whole `properties` bag, an evidence item, ...).
    Object,
    /// Schemaless property value.
    Any,
}

impl FieldType {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text | Self::Enum(_) => "text",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// One entry of a field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted name relative to the binding; `<...>` marks a free segment.
    pub name: &'static str,
    pub field_type: FieldType,
    pub multi_valued: bool,
}

const fn field(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        multi_valued: false,
    }
}

const fn multi(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        multi_valued: true,
    }
}

const NODE_FIELDS: &[FieldSpec] = &[
    field("id", FieldType::Text),
    field("name", FieldType::Text),
    field("type", FieldType::Enum(Vocabulary::EntityType)),
    multi("synonyms", FieldType::Text),
    field("external_ids", FieldType::Object),
    field("external_ids.<ontology>", FieldType::Text),
    field("properties", FieldType::Object),
    field("properties.<key>", FieldType::Any),
    field("similarity", FieldType::Number),
];

const EDGE_FIELDS: &[FieldSpec] = &[
    field("id", FieldType::Text),
    field("source_id", FieldType::Text),
    field("target_id", FieldType::Text),
    field("relation_type", FieldType::Enum(Vocabulary::RelationType)),
    field("directed", FieldType::Bool),
    field("layer", FieldType::Enum(Vocabulary::EdgeLayer)),
    field("confidence", FieldType::Number),
    field("evidence_count", FieldType::Number),
    multi("evidence", FieldType::Object),
    multi("evidence.<field>", FieldType::Any),
    field("extractor.name", FieldType::Text),
    field("extractor.version", FieldType::Text),
    field("supports", FieldType::Bool),
    field("strength", FieldType::Enum(Vocabulary::Strength)),
    field("properties", FieldType::Object),
    field("properties.<key>", FieldType::Any),
];

const EVIDENCE_FIELDS: &[FieldSpec] = &[
    field("paper_id", FieldType::Text),
    field("section_type", FieldType::Enum(Vocabulary::SectionType)),
    field("paragraph_idx", FieldType::Number),
    field(
        "extraction_method",
        FieldType::Enum(Vocabulary::ExtractionMethod),
    ),
    field("confidence", FieldType::Number),
    field("study_type", FieldType::Enum(Vocabulary::StudyType)),
    field("sample_size", FieldType::Number),
];

const PATH_FIELDS: &[FieldSpec] = &[
    field("length", FieldType::Number),
    multi("node_ids", FieldType::Text),
    multi("edge_ids", FieldType::Text),
    multi("relation_types", FieldType::Enum(Vocabulary::RelationType)),
];

/// What a query variable is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Node,
    Edge,
    Path,
}

impl BindingKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Path => "path",
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Read-only catalogue of query keys, fields and vocabularies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub const fn fields(&self, kind: BindingKind) -> &'static [FieldSpec] {
        match kind {
            BindingKind::Node => NODE_FIELDS,
            BindingKind::Edge => EDGE_FIELDS,
            BindingKind::Path => PATH_FIELDS,
        }
    }

    #[must_use]
    pub const fn evidence_fields(&self) -> &'static [FieldSpec] {
        EVIDENCE_FIELDS
    }

    /// Field spec by exact table name (`properties.<key>` style for free segments).
    #[must_use]
    pub fn field(&self, kind: BindingKind, name: &str) -> Option<FieldSpec> {
        self.fields(kind).iter().copied().find(|f| f.name == name)
    }

    #[must_use]
    pub fn evidence_field(&self, name: &str) -> Option<FieldSpec> {
        EVIDENCE_FIELDS.iter().copied().find(|f| f.name == name)
    }

    /// Field names for a binding kind, for error details.
    #[must_use]
    pub fn allowed_fields(&self, kind: BindingKind) -> Vec<String> {
        self.fields(kind)
            .iter()
            .map(|f| f.name.to_string())
            .collect()
    }

    #[must_use]
    pub fn allowed_evidence_fields(&self) -> Vec<String> {
        EVIDENCE_FIELDS.iter().map(|f| f.name.to_string()).collect()
    }

    /// Machine-readable description of the query surface.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        let fields = |specs: &[FieldSpec]| -> Vec<serde_json::Value> {
            specs
                .iter()
                .map(|f| {
                    json!({
                        "name": f.name,
                        "type": f.field_type.label(),
                        "multi_valued": f.multi_valued,
                    })
                })
                .collect()
        };
        json!({
            "find": FindType::labels(),
            "entity_types": EntityType::labels(),
            "relation_types": RelationType::labels(),
            "edge_layers": EdgeLayer::labels(),
            "directions": Direction::labels(),
            "study_types": StudyType::labels(),
            "section_types": SectionType::labels(),
            "extraction_methods": ExtractionMethod::labels(),
            "operators": Operator::labels(),
            "aggregations": AggFunc::labels(),
            "fields": {
                "node": fields(NODE_FIELDS),
                "edge": fields(EDGE_FIELDS),
                "evidence": fields(EVIDENCE_FIELDS),
                "path": fields(PATH_FIELDS),
            },
            "pattern_keys": {
                "query": PatternObject::Query.keys(),
                "node_pattern": PatternObject::NodePattern.keys(),
                "vector_search": PatternObject::VectorSearch.keys(),
                "edge_pattern": PatternObject::EdgePattern.keys(),
                "path_pattern": PatternObject::PathPattern.keys(),
                "filter": PatternObject::Filter.keys(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_pattern_keys_include_aliases() {
        let keys = PatternObject::NodePattern.keys();
        assert!(keys.contains(&"type"));
        assert!(keys.contains(&"node_type"));
        assert!(keys.contains(&"vector_search"));
        assert!(!keys.contains(&"invalid_field"));
        assert!(PatternObject::VectorSearch.keys().contains(&"top_k"));
    }

    #[test]
    fn field_lookup_by_kind() {
        let schema = SchemaRegistry::new();
        let confidence = schema
            .field(BindingKind::Edge, "confidence")
            .expect("edge confidence");
        assert_eq!(confidence.field_type, FieldType::Number);
        assert!(schema.field(BindingKind::Node, "confidence").is_none());
        assert!(
            schema
                .field(BindingKind::Path, "node_ids")
                .is_some_and(|f| f.multi_valued)
        );
    }

    #[test]
    fn vocabulary_canonicalizes_aliases() {
        assert_eq!(
            Vocabulary::SectionType.canonicalize("Intro").ok(),
            Some("introduction")
        );
        assert!(Vocabulary::EntityType.canonicalize("spaceship").is_err());
    }

    #[test]
    fn describe_lists_vocabularies() {
        let doc = SchemaRegistry::new().describe();
        let types = doc["entity_types"].as_array().expect("array");
        assert_eq!(types.len(), EntityType::ALL.len());
        assert_eq!(doc["fields"]["edge"][0]["name"], "id");
    }
}
