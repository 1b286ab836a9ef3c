//! # Field Resolver
//!
//! Compiles dotted field paths (`drug.name`, `rel.evidence.paper_id`,
//! `rel.evidence[study_type='rct'].confidence`, `path.length`) into typed
//! accessors, once per plan.
//!
//! A bound path starts with a query variable; a relative path (used by
//! pattern `property_filters`) starts directly at an attribute. Unknown
//! variables and attributes fail with the alternatives the registry allows.

use crate::confidence::truncate_confidence;
use crate::primitives::MAX_FIELD_PATH_LENGTH;
use crate::row::{Bound, PathSummary, Row};
use crate::schema::{BindingKind, FieldSpec, FieldType, SchemaRegistry};
use crate::similarity::QueryVector;
use crate::types::{Edge, EdgeKind, Entity, Evidence, ProvGraphError};
use crate::value::FieldValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Index of a binding in a row.
pub(crate) type Slot = usize;

// =============================================================================
// BINDINGS
// =============================================================================

/// Variable names in scope for a query, mapped to row slots.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bindings {
    kinds: Vec<BindingKind>,
    names: BTreeMap<String, Slot>,
    order: Vec<String>,
    /// Query embeddings of node slots matched by a `vector_search`.
    vectors: BTreeMap<Slot, Arc<QueryVector>>,
}

impl Bindings {
    /// Bind `name` to a fresh slot.
    pub(crate) fn bind(&mut self, name: &str, kind: BindingKind) -> Result<Slot, ProvGraphError> {
        let slot = self.kinds.len();
        self.kinds.push(kind);
        self.alias(name, slot)?;
        Ok(slot)
    }

    /// Make `name` refer to an existing slot.
    pub(crate) fn alias(&mut self, name: &str, slot: Slot) -> Result<(), ProvGraphError> {
        if self.names.contains_key(name) {
            return Err(ProvGraphError::Validation {
                message: format!("Variable '{}' is bound more than once", name),
                field: Some("var".to_string()),
                allowed: self.order.clone(),
            });
        }
        self.names.insert(name.to_string(), slot);
        self.order.push(name.to_string());
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<(Slot, BindingKind)> {
        let slot = *self.names.get(name)?;
        self.kinds.get(slot).map(|kind| (slot, *kind))
    }

    /// Score `slot` against `query`; the first embedding attached wins.
    pub(crate) fn attach_vector(&mut self, slot: Slot, query: &Arc<QueryVector>) {
        self.vectors
            .entry(slot)
            .or_insert_with(|| Arc::clone(query));
    }

    pub(crate) fn vector(&self, slot: Slot) -> Option<&Arc<QueryVector>> {
        self.vectors.get(&slot)
    }

    /// Number of slots a row needs.
    pub(crate) fn width(&self) -> usize {
        self.kinds.len()
    }

    /// Names in declaration order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.order.clone()
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

/// Comparison inside an evidence predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn test(self, actual: &FieldValue, expected: &FieldValue) -> bool {
        use std::cmp::Ordering;
        match self {
            Self::Eq => actual.loosely_equals(expected),
            Self::Ne => !actual.is_null() && !actual.loosely_equals(expected),
            Self::Gt => actual.compare_scalar(expected) == Some(Ordering::Greater),
            Self::Gte => matches!(
                actual.compare_scalar(expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt => actual.compare_scalar(expected) == Some(Ordering::Less),
            Self::Lte => matches!(
                actual.compare_scalar(expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvidenceAttr {
    PaperId,
    SectionType,
    ParagraphIdx,
    ExtractionMethod,
    Confidence,
    StudyType,
    SampleSize,
}

impl EvidenceAttr {
    const ALL: [Self; 7] = [
        Self::PaperId,
        Self::SectionType,
        Self::ParagraphIdx,
        Self::ExtractionMethod,
        Self::Confidence,
        Self::StudyType,
        Self::SampleSize,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::PaperId => "paper_id",
            Self::SectionType => "section_type",
            Self::ParagraphIdx => "paragraph_idx",
            Self::ExtractionMethod => "extraction_method",
            Self::Confidence => "confidence",
            Self::StudyType => "study_type",
            Self::SampleSize => "sample_size",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    fn read(self, e: &Evidence) -> FieldValue {
        match self {
            Self::PaperId => FieldValue::from(e.paper_id.as_str()),
            Self::SectionType => FieldValue::from(e.section_type.as_str()),
            Self::ParagraphIdx => FieldValue::Int(i64::from(e.paragraph_idx)),
            Self::ExtractionMethod => FieldValue::from(e.extraction_method.as_str()),
            Self::Confidence => FieldValue::Float(e.confidence.value()),
            Self::StudyType => e
                .study_type
                .map_or(FieldValue::Null, |s| FieldValue::from(s.as_str())),
            Self::SampleSize => e
                .sample_size
                .and_then(|n| i64::try_from(n).ok())
                .map_or(FieldValue::Null, FieldValue::Int),
        }
    }

    fn item(e: &Evidence) -> FieldValue {
        FieldValue::Map(
            Self::ALL
                .into_iter()
                .map(|a| (a.name().to_string(), a.read(e)))
                .collect(),
        )
    }
}

/// `[attr op literal]` selection over a claim's evidence list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EvidencePredicate {
    attr: EvidenceAttr,
    comparison: Comparison,
    literal: FieldValue,
}

impl EvidencePredicate {
    fn matches(&self, e: &Evidence) -> bool {
        self.comparison.test(&self.attr.read(e), &self.literal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeAttr {
    Id,
    Name,
    Type,
    Synonyms,
    ExternalIds,
    ExternalId(String),
    Properties,
    Property(Vec<String>),
    /// Cosine similarity to the slot's query embedding.
    Similarity(Arc<QueryVector>),
}

impl NodeAttr {
    fn read(&self, entity: &Entity) -> FieldValue {
        match self {
            Self::Id => FieldValue::from(entity.id.as_str()),
            Self::Name => FieldValue::from(entity.name.as_str()),
            Self::Type => FieldValue::from(entity.entity_type.as_str()),
            Self::Synonyms => FieldValue::List(
                entity
                    .synonyms
                    .iter()
                    .map(|s| FieldValue::from(s.as_str()))
                    .collect(),
            ),
            Self::ExternalIds => FieldValue::Map(
                entity
                    .external_ids
                    .iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from(v.as_str())))
                    .collect(),
            ),
            Self::ExternalId(key) => entity
                .external_ids
                .get(key)
                .map_or(FieldValue::Null, |v| FieldValue::from(v.as_str())),
            Self::Properties => property_bag(&entity.properties),
            Self::Property(path) => property(&entity.properties, path),
            Self::Similarity(query) => query
                .score(entity)
                .map_or(FieldValue::Null, FieldValue::Float),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EdgeAttr {
    Id,
    SourceId,
    TargetId,
    RelationType,
    Directed,
    Layer,
    Confidence,
    EvidenceCount,
    Evidence {
        predicate: Option<EvidencePredicate>,
        attr: Option<EvidenceAttr>,
    },
    ExtractorName,
    ExtractorVersion,
    Supports,
    Strength,
    Properties,
    Property(Vec<String>),
}

impl EdgeAttr {
    fn read(&self, edge: &Edge) -> FieldValue {
        match self {
            Self::Id => FieldValue::from(edge.id.as_str()),
            Self::SourceId => FieldValue::from(edge.source_id.as_str()),
            Self::TargetId => FieldValue::from(edge.target.as_str()),
            Self::RelationType => FieldValue::from(edge.relation_type.as_str()),
            Self::Directed => FieldValue::Bool(edge.directed),
            Self::Layer => FieldValue::from(edge.layer().as_str()),
            Self::Confidence => edge
                .confidence()
                .map_or(FieldValue::Null, |c| FieldValue::Float(truncate_confidence(c))),
            Self::EvidenceCount => FieldValue::Int(edge.evidence_count() as i64),
            Self::Evidence { predicate, attr } => {
                let Some(claim) = edge.as_claim() else {
                    return FieldValue::List(Vec::new());
                };
                FieldValue::List(
                    claim
                        .evidence()
                        .iter()
                        .filter(|e| predicate.as_ref().is_none_or(|p| p.matches(e)))
                        .map(|e| match attr {
                            Some(a) => a.read(e),
                            None => EvidenceAttr::item(e),
                        })
                        .filter(|v| !v.is_null())
                        .collect(),
                )
            }
            Self::ExtractorName | Self::ExtractorVersion => match &edge.kind {
                EdgeKind::Extraction(x) if *self == Self::ExtractorName => {
                    FieldValue::from(x.extractor.name.as_str())
                }
                EdgeKind::Extraction(x) => FieldValue::from(x.extractor.version.as_str()),
                _ => FieldValue::Null,
            },
            Self::Supports => match &edge.kind {
                EdgeKind::EvidenceSupport(s) => FieldValue::Bool(s.supports),
                _ => FieldValue::Null,
            },
            Self::Strength => match &edge.kind {
                EdgeKind::EvidenceSupport(s) => FieldValue::from(s.strength.as_str()),
                _ => FieldValue::Null,
            },
            Self::Properties => property_bag(&edge.properties),
            Self::Property(path) => property(&edge.properties, path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathAttr {
    Length,
    NodeIds,
    EdgeIds,
    RelationTypes,
}

impl PathAttr {
    fn read(self, path: &PathSummary) -> FieldValue {
        match self {
            Self::Length => FieldValue::Int(path.length() as i64),
            Self::NodeIds => FieldValue::List(
                path.node_ids
                    .iter()
                    .map(|id| FieldValue::from(id.as_str()))
                    .collect(),
            ),
            Self::EdgeIds => FieldValue::List(
                path.edge_ids
                    .iter()
                    .map(|id| FieldValue::from(id.as_str()))
                    .collect(),
            ),
            Self::RelationTypes => FieldValue::List(
                path.relation_types
                    .iter()
                    .map(|r| FieldValue::from(r.as_str()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Accessor {
    Node(NodeAttr),
    Edge(EdgeAttr),
    Path(PathAttr),
}

impl Accessor {
    /// Read from a bound value; a kind mismatch reads as `Null`.
    pub(crate) fn read(&self, bound: &Bound) -> FieldValue {
        match (self, bound) {
            (Self::Node(a), Bound::Node(e)) => a.read(e),
            (Self::Edge(a), Bound::Edge(e)) => a.read(e),
            (Self::Path(a), Bound::Path(p)) => a.read(p),
            _ => FieldValue::Null,
        }
    }

    pub(crate) fn read_node(&self, entity: &Entity) -> FieldValue {
        match self {
            Self::Node(a) => a.read(entity),
            _ => FieldValue::Null,
        }
    }

    pub(crate) fn read_edge(&self, edge: &Edge) -> FieldValue {
        match self {
            Self::Edge(a) => a.read(edge),
            _ => FieldValue::Null,
        }
    }
}

fn property_bag(props: &BTreeMap<String, serde_json::Value>) -> FieldValue {
    FieldValue::Map(
        props
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect(),
    )
}

fn property(props: &BTreeMap<String, serde_json::Value>, path: &[String]) -> FieldValue {
    let Some((first, rest)) = path.split_first() else {
        return property_bag(props);
    };
    let mut current = props.get(first);
    for key in rest {
        current = current.and_then(|v| v.get(key));
    }
    current.map_or(FieldValue::Null, FieldValue::from_json)
}

/// A field path compiled against a binding slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledField {
    pub(crate) path: String,
    pub(crate) slot: Slot,
    pub(crate) accessor: Accessor,
    pub(crate) field_type: FieldType,
    pub(crate) multi_valued: bool,
}

impl CompiledField {
    pub(crate) fn eval(&self, row: &Row) -> FieldValue {
        row.get(self.slot)
            .map_or(FieldValue::Null, |b| self.accessor.read(b))
    }
}

// =============================================================================
// PATH SYNTAX
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    name: String,
    predicate: Option<String>,
}

fn malformed(path: &str, why: &str) -> ProvGraphError {
    ProvGraphError::Validation {
        message: format!("Malformed field path '{}': {}", path, why),
        field: Some(path.to_string()),
        allowed: Vec::new(),
    }
}

fn split_path(path: &str) -> Result<Vec<Segment>, ProvGraphError> {
    if path.len() > MAX_FIELD_PATH_LENGTH {
        return Err(malformed(
            path,
            &format!("longer than {} bytes", MAX_FIELD_PATH_LENGTH),
        ));
    }

    let mut segments = Vec::new();
    let mut name = String::new();
    let mut predicate: Option<String> = None;
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if name.is_empty() {
                    return Err(malformed(path, "empty segment"));
                }
                segments.push(Segment {
                    name: std::mem::take(&mut name),
                    predicate: predicate.take(),
                });
            }
            '[' => {
                if name.is_empty() || predicate.is_some() {
                    return Err(malformed(path, "misplaced '['"));
                }
                let mut body = String::new();
                let mut quote: Option<char> = None;
                let mut closed = false;
                for c in chars.by_ref() {
                    match (quote, c) {
                        (None, ']') => {
                            closed = true;
                            break;
                        }
                        (None, '\'' | '"') => {
                            quote = Some(c);
                            body.push(c);
                        }
                        (Some(q), c) if c == q => {
                            quote = None;
                            body.push(c);
                        }
                        _ => body.push(c),
                    }
                }
                if !closed {
                    return Err(malformed(path, "unterminated '['"));
                }
                predicate = Some(body);
            }
            _ if predicate.is_some() => return Err(malformed(path, "expected '.' after ']'")),
            c => name.push(c),
        }
    }

    if name.is_empty() {
        return Err(malformed(path, "empty segment"));
    }
    segments.push(Segment { name, predicate });
    Ok(segments)
}

fn parse_literal(text: &str) -> Option<FieldValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(FieldValue::from(&text[1..text.len() - 1]));
        }
    }
    if let Ok(b) = text.parse::<bool>() {
        return Some(FieldValue::Bool(b));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(FieldValue::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Some(FieldValue::Float(f));
    }
    Some(FieldValue::from(text))
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Resolves field paths against the schema registry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldResolver<'a> {
    schema: &'a SchemaRegistry,
}

impl<'a> FieldResolver<'a> {
    pub(crate) const fn new(schema: &'a SchemaRegistry) -> Self {
        Self { schema }
    }

    /// Resolve `var.attr...` against the bindings in scope.
    pub(crate) fn resolve(
        &self,
        path: &str,
        bindings: &Bindings,
    ) -> Result<CompiledField, ProvGraphError> {
        let segments = split_path(path)?;
        let Some((head, rest)) = segments.split_first() else {
            return Err(malformed(path, "empty path"));
        };
        let Some((slot, kind)) = bindings.lookup(&head.name) else {
            return Err(ProvGraphError::Validation {
                message: format!("Unknown variable '{}' in field '{}'", head.name, path),
                field: Some(path.to_string()),
                allowed: bindings.names(),
            });
        };
        if head.predicate.is_some() {
            return Err(malformed(path, "a variable cannot carry a predicate"));
        }
        if rest.is_empty() {
            return Err(ProvGraphError::Validation {
                message: format!("Field '{}' must name an attribute of '{}'", path, head.name),
                field: Some(path.to_string()),
                allowed: self
                    .schema
                    .allowed_fields(kind)
                    .into_iter()
                    .map(|f| format!("{}.{}", head.name, f))
                    .collect(),
            });
        }
        self.compile(path, slot, kind, rest, bindings.vector(slot))
    }

    /// Resolve a path relative to a single node or edge (slot 0).
    pub(crate) fn resolve_relative(
        &self,
        path: &str,
        kind: BindingKind,
    ) -> Result<CompiledField, ProvGraphError> {
        let segments = split_path(path)?;
        self.compile(path, 0, kind, &segments, None)
    }

    fn compile(
        &self,
        path: &str,
        slot: Slot,
        kind: BindingKind,
        segments: &[Segment],
        vector: Option<&Arc<QueryVector>>,
    ) -> Result<CompiledField, ProvGraphError> {
        let (accessor, spec) = match kind {
            BindingKind::Node => self.node_attr(path, segments, vector)?,
            BindingKind::Edge => self.edge_attr(path, segments)?,
            BindingKind::Path => self.path_attr(path, segments)?,
        };
        Ok(CompiledField {
            path: path.to_string(),
            slot,
            accessor,
            field_type: spec.field_type,
            multi_valued: spec.multi_valued,
        })
    }

    fn spec(&self, kind: BindingKind, name: &str, path: &str) -> Result<FieldSpec, ProvGraphError> {
        self.schema
            .field(kind, name)
            .ok_or_else(|| ProvGraphError::invalid_field(path, self.schema.allowed_fields(kind)))
    }

    fn no_predicates(path: &str, segments: &[Segment]) -> Result<(), ProvGraphError> {
        if segments.iter().any(|s| s.predicate.is_some()) {
            return Err(malformed(path, "predicates are only allowed on 'evidence'"));
        }
        Ok(())
    }

    fn node_attr(
        &self,
        path: &str,
        segments: &[Segment],
        vector: Option<&Arc<QueryVector>>,
    ) -> Result<(Accessor, FieldSpec), ProvGraphError> {
        Self::no_predicates(path, segments)?;
        let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
        let (attr, spec) = match names.as_slice() {
            ["id"] => (NodeAttr::Id, "id"),
            ["name"] => (NodeAttr::Name, "name"),
            ["type" | "node_type" | "entity_type"] => (NodeAttr::Type, "type"),
            ["synonyms"] => (NodeAttr::Synonyms, "synonyms"),
            ["external_ids"] => (NodeAttr::ExternalIds, "external_ids"),
            ["external_ids", key] => (
                NodeAttr::ExternalId((*key).to_string()),
                "external_ids.<ontology>",
            ),
            ["properties"] => (NodeAttr::Properties, "properties"),
            ["properties", rest @ ..] => (
                NodeAttr::Property(rest.iter().map(|s| (*s).to_string()).collect()),
                "properties.<key>",
            ),
            ["similarity"] => match vector {
                Some(query) => (NodeAttr::Similarity(Arc::clone(query)), "similarity"),
                None => {
                    return Err(ProvGraphError::Validation {
                        message: format!(
                            "Field '{}' needs a vector_search on the pattern that binds it",
                            path
                        ),
                        field: Some(path.to_string()),
                        allowed: Vec::new(),
                    });
                }
            },
            _ => {
                return Err(ProvGraphError::invalid_field(
                    path,
                    self.schema.allowed_fields(BindingKind::Node),
                ));
            }
        };
        Ok((Accessor::Node(attr), self.spec(BindingKind::Node, spec, path)?))
    }

    fn edge_attr(
        &self,
        path: &str,
        segments: &[Segment],
    ) -> Result<(Accessor, FieldSpec), ProvGraphError> {
        if segments.first().is_some_and(|s| s.name == "evidence") {
            return self.evidence_attr(path, segments);
        }
        Self::no_predicates(path, segments)?;
        let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
        let (attr, spec) = match names.as_slice() {
            ["id" | "edge_id"] => (EdgeAttr::Id, "id"),
            ["source_id" | "subject_id"] => (EdgeAttr::SourceId, "source_id"),
            ["target_id" | "object_id"] => (EdgeAttr::TargetId, "target_id"),
            ["relation_type" | "predicate"] => (EdgeAttr::RelationType, "relation_type"),
            ["directed"] => (EdgeAttr::Directed, "directed"),
            ["layer" | "kind"] => (EdgeAttr::Layer, "layer"),
            ["confidence"] => (EdgeAttr::Confidence, "confidence"),
            ["evidence_count"] => (EdgeAttr::EvidenceCount, "evidence_count"),
            ["extractor", "name"] => (EdgeAttr::ExtractorName, "extractor.name"),
            ["extractor", "version"] => (EdgeAttr::ExtractorVersion, "extractor.version"),
            ["supports"] => (EdgeAttr::Supports, "supports"),
            ["strength"] => (EdgeAttr::Strength, "strength"),
            ["properties"] => (EdgeAttr::Properties, "properties"),
            ["properties", rest @ ..] => (
                EdgeAttr::Property(rest.iter().map(|s| (*s).to_string()).collect()),
                "properties.<key>",
            ),
            _ => {
                return Err(ProvGraphError::invalid_field(
                    path,
                    self.schema.allowed_fields(BindingKind::Edge),
                ));
            }
        };
        Ok((Accessor::Edge(attr), self.spec(BindingKind::Edge, spec, path)?))
    }

    fn evidence_attr(
        &self,
        path: &str,
        segments: &[Segment],
    ) -> Result<(Accessor, FieldSpec), ProvGraphError> {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return Err(malformed(path, "empty path")),
        };
        Self::no_predicates(path, rest)?;
        let predicate = head
            .predicate
            .as_deref()
            .map(|text| self.parse_predicate(path, text))
            .transpose()?;

        let unknown = || {
            ProvGraphError::invalid_field(
                path,
                self.schema
                    .allowed_evidence_fields()
                    .into_iter()
                    .map(|f| format!("evidence.{}", f))
                    .collect(),
            )
        };

        match rest {
            [] => Ok((
                Accessor::Edge(EdgeAttr::Evidence {
                    predicate,
                    attr: None,
                }),
                self.spec(BindingKind::Edge, "evidence", path)?,
            )),
            [field] => {
                let attr = EvidenceAttr::parse(&field.name).ok_or_else(unknown)?;
                let spec = self.schema.evidence_field(attr.name()).ok_or_else(unknown)?;
                Ok((
                    Accessor::Edge(EdgeAttr::Evidence {
                        predicate,
                        attr: Some(attr),
                    }),
                    FieldSpec {
                        name: "evidence.<field>",
                        field_type: spec.field_type,
                        multi_valued: true,
                    },
                ))
            }
            _ => Err(unknown()),
        }
    }

    fn parse_predicate(&self, path: &str, text: &str) -> Result<EvidencePredicate, ProvGraphError> {
        let Some(at) = text.find(['=', '!', '<', '>']) else {
            return Err(malformed(path, "predicate needs an operator"));
        };
        let attr_name = text[..at].trim();
        let tail = &text[at..];
        let (comparison, width) = if tail.starts_with("!=") {
            (Comparison::Ne, 2)
        } else if tail.starts_with(">=") {
            (Comparison::Gte, 2)
        } else if tail.starts_with("<=") {
            (Comparison::Lte, 2)
        } else if tail.starts_with("==") {
            (Comparison::Eq, 2)
        } else if tail.starts_with('=') {
            (Comparison::Eq, 1)
        } else if tail.starts_with('>') {
            (Comparison::Gt, 1)
        } else if tail.starts_with('<') {
            (Comparison::Lt, 1)
        } else {
            return Err(malformed(path, "unknown predicate operator"));
        };

        let attr = EvidenceAttr::parse(attr_name).ok_or_else(|| {
            ProvGraphError::invalid_field(
                format!("{} ({})", path, attr_name),
                self.schema.allowed_evidence_fields(),
            )
        })?;
        let literal = parse_literal(&tail[width..])
            .ok_or_else(|| malformed(path, "predicate needs a value"))?;

        let literal = match (
            self.schema.evidence_field(attr.name()).map(|s| s.field_type),
            &literal,
        ) {
            (Some(FieldType::Enum(vocab)), FieldValue::Str(s)) => {
                FieldValue::from(vocab.canonicalize(s).map_err(|e| e.at_field(path))?)
            }
            (Some(FieldType::Number), v) if v.as_f64().is_none() => {
                return Err(malformed(
                    path,
                    &format!("'{}' compares against a number", attr.name()),
                ));
            }
            _ => literal,
        };

        Ok(EvidencePredicate {
            attr,
            comparison,
            literal,
        })
    }

    fn path_attr(
        &self,
        path: &str,
        segments: &[Segment],
    ) -> Result<(Accessor, FieldSpec), ProvGraphError> {
        Self::no_predicates(path, segments)?;
        let names: Vec<&str> = segments.iter().map(|s| s.name.as_str()).collect();
        let (attr, spec) = match names.as_slice() {
            ["length"] => (PathAttr::Length, "length"),
            ["node_ids"] => (PathAttr::NodeIds, "node_ids"),
            ["edge_ids"] => (PathAttr::EdgeIds, "edge_ids"),
            ["relation_types"] => (PathAttr::RelationTypes, "relation_types"),
            _ => {
                return Err(ProvGraphError::invalid_field(
                    path,
                    self.schema.allowed_fields(BindingKind::Path),
                ));
            }
        };
        Ok((Accessor::Path(attr), self.spec(BindingKind::Path, spec, path)?))
    }
}

// =============================================================================
// FIELD ARENA
// =============================================================================

/// Handle into a [`FieldArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldId(usize);

/// Every field a plan touches, compiled once and shared by filters,
/// grouping, ordering and projection.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldArena {
    fields: Vec<CompiledField>,
    index: BTreeMap<String, FieldId>,
}

impl FieldArena {
    pub(crate) fn intern(
        &mut self,
        path: &str,
        bindings: &Bindings,
        resolver: &FieldResolver<'_>,
    ) -> Result<FieldId, ProvGraphError> {
        if let Some(id) = self.index.get(path) {
            return Ok(*id);
        }
        let compiled = resolver.resolve(path, bindings)?;
        let id = FieldId(self.fields.len());
        self.fields.push(compiled);
        self.index.insert(path.to_string(), id);
        Ok(id)
    }

    pub(crate) fn get(&self, id: FieldId) -> Option<&CompiledField> {
        self.fields.get(id.0)
    }

    pub(crate) fn eval(&self, id: FieldId, row: &Row) -> FieldValue {
        self.get(id).map_or(FieldValue::Null, |f| f.eval(row))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::WeightTable;
    use crate::types::{
        ClaimEdge, EntityType, ExtractionMethod, Probability, RelationType, SectionType,
        StudyType,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn bindings() -> Bindings {
        let mut b = Bindings::default();
        b.bind("drug", BindingKind::Node).expect("bind");
        b.bind("rel", BindingKind::Edge).expect("bind");
        b
    }

    fn claim() -> Edge {
        let ev = |paper: &str, c: f64, s: StudyType| {
            Evidence::new(
                paper,
                SectionType::Results,
                ExtractionMethod::Llm,
                Probability::new(c).expect("p"),
            )
            .with_study_type(s)
        };
        let payload = ClaimEdge::new(
            vec![
                ev("pmid:1", 0.9, StudyType::Rct),
                ev("pmid:2", 0.6, StudyType::Cohort),
                ev("pmid:3", 0.8, StudyType::Rct),
            ],
            &WeightTable::default(),
        )
        .expect("claim");
        Edge::claim("c1", "d1", "dis1", RelationType::Treats, payload)
            .with_property("source", json!({"db": "semmed"}))
    }

    fn row_with(edge: Edge) -> Row {
        let mut row = Row::new(2);
        row.set(
            0,
            Bound::Node(Arc::new(
                Entity::new("d1", EntityType::Drug, "Tamoxifen").with_external_id("RxNorm", "10324"),
            )),
        );
        row.set(1, Bound::Edge(Arc::new(edge)));
        row
    }

    #[test]
    fn resolves_node_and_edge_fields() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let b = bindings();
        let row = row_with(claim());

        let name = resolver.resolve("drug.name", &b).expect("name");
        assert_eq!(name.eval(&row), FieldValue::from("Tamoxifen"));
        let rx = resolver
            .resolve("drug.external_ids.RxNorm", &b)
            .expect("external id");
        assert_eq!(rx.eval(&row), FieldValue::from("10324"));
        let count = resolver.resolve("rel.evidence_count", &b).expect("count");
        assert_eq!(count.eval(&row), FieldValue::Int(3));
        let nested = resolver.resolve("rel.properties.source.db", &b).expect("nested");
        assert_eq!(nested.eval(&row), FieldValue::from("semmed"));
    }

    #[test]
    fn evidence_projection_is_multi_valued() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let field = resolver
            .resolve("rel.evidence.paper_id", &bindings())
            .expect("evidence");
        assert!(field.multi_valued);
        let value = field.eval(&row_with(claim()));
        assert_eq!(value.flatten().len(), 3);
    }

    #[test]
    fn evidence_predicate_selects_items() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let field = resolver
            .resolve("rel.evidence[study_type='RCT'].paper_id", &bindings())
            .expect("predicate");
        assert_eq!(
            field.eval(&row_with(claim())),
            FieldValue::List(vec![FieldValue::from("pmid:1"), FieldValue::from("pmid:3")])
        );

        let high = resolver
            .resolve("rel.evidence[confidence>=0.8].confidence", &bindings())
            .expect("numeric predicate");
        assert_eq!(high.eval(&row_with(claim())).flatten().len(), 2);
    }

    #[test]
    fn unknown_variable_lists_bindings() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let err = resolver
            .resolve("target.name", &bindings())
            .expect_err("unknown variable");
        assert!(matches!(
            err,
            ProvGraphError::Validation { ref allowed, .. } if allowed == &["drug".to_string(), "rel".to_string()]
        ));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let err = resolver
            .resolve("drug.confidence", &bindings())
            .expect_err("node has no confidence");
        assert!(matches!(
            err,
            ProvGraphError::Validation { field: Some(ref f), ref allowed, .. }
                if f == "drug.confidence" && allowed.contains(&"name".to_string())
        ));
        assert!(resolver.resolve("rel.evidence.journal", &bindings()).is_err());
        assert!(
            resolver
                .resolve("rel.evidence[study_type='spaceship']", &bindings())
                .is_err()
        );
        assert!(resolver.resolve("drug.name[x=1]", &bindings()).is_err());
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for path in ["", "drug..name", "drug.", "rel.evidence[study_type='rct'", "rel.evidence[a=1]x"] {
            assert!(split_path(path).is_err(), "{path}");
        }
        let segments = split_path("rel.evidence[paper_id='a.b]c'].confidence").expect("quoted");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].predicate.as_deref(), Some("paper_id='a.b]c'"));
    }

    #[test]
    fn bindings_reject_duplicates() {
        let mut b = bindings();
        assert!(b.bind("drug", BindingKind::Node).is_err());
        assert!(b.alias("source", 0).is_ok());
        assert_eq!(b.lookup("source"), Some((0, BindingKind::Node)));
        assert_eq!(b.width(), 2);
    }

    #[test]
    fn arena_interns_each_path_once() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let b = bindings();
        let mut arena = FieldArena::default();
        let a = arena.intern("drug.name", &b, &resolver).expect("intern");
        let again = arena.intern("drug.name", &b, &resolver).expect("intern");
        assert_eq!(a, again);
        assert_eq!(arena.eval(a, &row_with(claim())), FieldValue::from("Tamoxifen"));
    }

    #[test]
    fn relative_fields_read_single_values() {
        let schema = SchemaRegistry::new();
        let resolver = FieldResolver::new(&schema);
        let field = resolver
            .resolve_relative("properties.source.db", BindingKind::Edge)
            .expect("relative");
        assert_eq!(field.accessor.read_edge(&claim()), FieldValue::from("semmed"));
        assert_eq!(
            field.accessor.read_node(&Entity::new("x", EntityType::Gene, "BRCA1")),
            FieldValue::Null
        );
    }
}
