//! # Filter Compilation
//!
//! Turns `{field, operator, value}` triples into predicates over compiled
//! fields. Values are type-checked against the field's schema type when the
//! plan is built, so evaluation never fails.
//!
//! Semantics:
//! - string `eq`/`ne`/`in`/`contains` ignore case; `regex` searches case-insensitively
//! - on a multi-valued field a predicate holds when any item satisfies it,
//!   except `ne`, which holds when no item equals the value
//! - `null` fails every operator except `ne`

use crate::field::{Bindings, CompiledField, FieldArena, FieldId, FieldResolver};
use crate::primitives::{MAX_REGEX_PATTERN_LENGTH, REGEX_SIZE_LIMIT};
use crate::query::{Filter, Operator};
use crate::row::Row;
use crate::schema::{BindingKind, FieldType};
use crate::types::{Edge, Entity, ProvGraphError};
use crate::value::FieldValue;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

/// A compiled operator with its operand.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Eq(FieldValue),
    Ne(FieldValue),
    Range(Operator, FieldValue),
    In(Vec<FieldValue>),
    Contains(FieldValue),
    Regex(Regex),
}

fn type_error(field: &CompiledField, operator: Operator, expected: &str) -> ProvGraphError {
    ProvGraphError::Validation {
        message: format!(
            "Operator '{}' on '{}' ({}) needs {}",
            operator,
            field.path,
            field.field_type.label(),
            expected
        ),
        field: Some(field.path.clone()),
        allowed: Vec::new(),
    }
}

/// Build a case-insensitive regex within the pattern length and size limits.
pub(crate) fn compile_regex(pattern: &str, field: &str) -> Result<Regex, ProvGraphError> {
    if pattern.len() > MAX_REGEX_PATTERN_LENGTH {
        return Err(ProvGraphError::Validation {
            message: format!(
                "Regex pattern exceeds {} characters",
                MAX_REGEX_PATTERN_LENGTH
            ),
            field: Some(field.to_string()),
            allowed: Vec::new(),
        });
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ProvGraphError::Validation {
            message: format!("Invalid regex '{}': {}", pattern, e),
            field: Some(field.to_string()),
            allowed: Vec::new(),
        })
}

impl Predicate {
    /// Check `value` against the field type and build the predicate.
    pub(crate) fn compile(
        operator: Operator,
        value: &Value,
        field: &CompiledField,
    ) -> Result<Self, ProvGraphError> {
        if field.field_type == FieldType::Object {
            return Err(ProvGraphError::Validation {
                message: format!(
                    "Field '{}' is an object; filter one of its attributes instead",
                    field.path
                ),
                field: Some(field.path.clone()),
                allowed: Vec::new(),
            });
        }

        match operator {
            Operator::Eq => Ok(Self::Eq(Self::operand(operator, value, field, true)?)),
            Operator::Ne => Ok(Self::Ne(Self::operand(operator, value, field, true)?)),
            Operator::In => {
                let items = value
                    .as_array()
                    .ok_or_else(|| type_error(field, operator, "an array value"))?;
                items
                    .iter()
                    .map(|v| Self::operand(operator, v, field, false))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::In)
            }
            Operator::Contains => {
                if matches!(field.field_type, FieldType::Number | FieldType::Bool)
                    && !field.multi_valued
                {
                    return Err(type_error(field, operator, "a text or multi-valued field"));
                }
                match value {
                    Value::Null | Value::Array(_) | Value::Object(_) => {
                        Err(type_error(field, operator, "a scalar value"))
                    }
                    v => Ok(Self::Contains(FieldValue::from_json(v))),
                }
            }
            Operator::Regex => {
                let pattern = value
                    .as_str()
                    .ok_or_else(|| type_error(field, operator, "a string pattern"))?;
                if matches!(field.field_type, FieldType::Number | FieldType::Bool) {
                    return Err(type_error(field, operator, "a text field"));
                }
                Ok(Self::Regex(compile_regex(pattern, &field.path)?))
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let ok = matches!(
                    (field.field_type, value),
                    (FieldType::Number, Value::Number(_))
                        | (FieldType::Text | FieldType::Enum(_), Value::String(_))
                        | (FieldType::Any, Value::Number(_) | Value::String(_))
                );
                if !ok {
                    let expected = match field.field_type {
                        FieldType::Number => "a number",
                        FieldType::Bool => "a field with an ordering (bool has none)",
                        _ => "a number or string",
                    };
                    return Err(type_error(field, operator, expected));
                }
                Ok(Self::Range(operator, FieldValue::from_json(value)))
            }
        }
    }

    /// Type-check one scalar operand; vocabulary values are canonicalized.
    fn operand(
        operator: Operator,
        value: &Value,
        field: &CompiledField,
        allow_null: bool,
    ) -> Result<FieldValue, ProvGraphError> {
        match (field.field_type, value) {
            (_, Value::Null) if allow_null => Ok(FieldValue::Null),
            (_, Value::Null | Value::Array(_) | Value::Object(_)) => {
                Err(type_error(field, operator, "a scalar value"))
            }
            (FieldType::Enum(vocab), Value::String(s)) => vocab
                .canonicalize(s)
                .map(FieldValue::from)
                .map_err(|e| e.at_field(&field.path)),
            (FieldType::Number, Value::Number(_))
            | (FieldType::Bool, Value::Bool(_))
            | (FieldType::Text, Value::String(_))
            | (FieldType::Any, _) => Ok(FieldValue::from_json(value)),
            (FieldType::Number, _) => Err(type_error(field, operator, "a number")),
            (FieldType::Bool, _) => Err(type_error(field, operator, "a boolean")),
            _ => Err(type_error(field, operator, "a string")),
        }
    }

    pub(crate) fn test(&self, actual: &FieldValue) -> bool {
        match actual {
            FieldValue::List(items) => match self {
                Self::Ne(v) => !items.iter().any(|i| i.loosely_equals(v)),
                Self::Contains(v) => items.iter().any(|i| i.loosely_equals(v)),
                _ => items.iter().any(|i| self.test_scalar(i)),
            },
            other => self.test_scalar(other),
        }
    }

    fn test_scalar(&self, actual: &FieldValue) -> bool {
        if actual.is_null() {
            return match self {
                Self::Eq(v) => v.is_null(),
                Self::Ne(v) => !v.is_null(),
                _ => false,
            };
        }
        match self {
            Self::Eq(v) => actual.loosely_equals(v),
            Self::Ne(v) => !actual.loosely_equals(v),
            Self::Range(op, v) => actual.compare_scalar(v).is_some_and(|ord| match op {
                Operator::Gt => ord == Ordering::Greater,
                Operator::Gte => ord != Ordering::Less,
                Operator::Lt => ord == Ordering::Less,
                Operator::Lte => ord != Ordering::Greater,
                _ => false,
            }),
            Self::In(values) => values.iter().any(|v| actual.loosely_equals(v)),
            Self::Contains(v) => match (actual, v) {
                (FieldValue::Str(a), FieldValue::Str(b)) => {
                    a.to_lowercase().contains(&b.to_lowercase())
                }
                (FieldValue::Map(map), FieldValue::Str(key)) => map.contains_key(key),
                (a, b) => a.loosely_equals(b),
            },
            Self::Regex(re) => actual.as_str().is_some_and(|s| re.is_match(s)),
        }
    }
}

// =============================================================================
// ROW FILTERS
// =============================================================================

/// A filter over a bound variable's field.
#[derive(Debug, Clone)]
pub(crate) struct CompiledFilter {
    field: FieldId,
    predicate: Predicate,
}

impl CompiledFilter {
    pub(crate) fn compile(
        filter: &Filter,
        arena: &mut FieldArena,
        bindings: &Bindings,
        resolver: &FieldResolver<'_>,
    ) -> Result<Self, ProvGraphError> {
        let id = arena.intern(&filter.field, bindings, resolver)?;
        let field = arena.get(id).ok_or_else(|| {
            ProvGraphError::invalid_field(filter.field.clone(), bindings.names())
        })?;
        Ok(Self {
            field: id,
            predicate: Predicate::compile(filter.operator, &filter.value, field)?,
        })
    }

    pub(crate) fn test(&self, arena: &FieldArena, row: &Row) -> bool {
        self.predicate.test(&arena.eval(self.field, row))
    }
}

/// A filter relative to one node or edge, used inside patterns.
#[derive(Debug, Clone)]
pub(crate) struct RelativeFilter {
    field: CompiledField,
    predicate: Predicate,
}

impl RelativeFilter {
    pub(crate) fn compile(
        filter: &Filter,
        kind: BindingKind,
        resolver: &FieldResolver<'_>,
    ) -> Result<Self, ProvGraphError> {
        let field = resolver.resolve_relative(&filter.field, kind)?;
        let predicate = Predicate::compile(filter.operator, &filter.value, &field)?;
        Ok(Self { field, predicate })
    }

    pub(crate) fn test_node(&self, entity: &Entity) -> bool {
        self.predicate.test(&self.field.accessor.read_node(entity))
    }

    pub(crate) fn test_edge(&self, edge: &Edge) -> bool {
        self.predicate.test(&self.field.accessor.read_edge(edge))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use serde_json::json;

    fn edge_field(path: &str) -> CompiledField {
        let schema = SchemaRegistry::new();
        FieldResolver::new(&schema)
            .resolve_relative(path, BindingKind::Edge)
            .expect("field")
    }

    fn node_field(path: &str) -> CompiledField {
        let schema = SchemaRegistry::new();
        FieldResolver::new(&schema)
            .resolve_relative(path, BindingKind::Node)
            .expect("field")
    }

    #[test]
    fn string_equality_ignores_case() {
        let p = Predicate::compile(Operator::Eq, &json!("breast cancer"), &node_field("name"))
            .expect("eq");
        assert!(p.test(&FieldValue::from("Breast Cancer")));
        assert!(!p.test(&FieldValue::from("Lung Cancer")));
    }

    #[test]
    fn multi_valued_any_semantics() {
        let field = edge_field("evidence.study_type");
        let items = FieldValue::List(vec![FieldValue::from("rct"), FieldValue::from("cohort")]);

        let eq = Predicate::compile(Operator::Eq, &json!("rct"), &field).expect("eq");
        assert!(eq.test(&items));
        let ne = Predicate::compile(Operator::Ne, &json!("rct"), &field).expect("ne");
        assert!(!ne.test(&items));
        let ne_other = Predicate::compile(Operator::Ne, &json!("review"), &field).expect("ne");
        assert!(ne_other.test(&items));
        let contains = Predicate::compile(Operator::Contains, &json!("cohort"), &field).expect("contains");
        assert!(contains.test(&items));
    }

    #[test]
    fn null_fails_all_but_ne() {
        let field = edge_field("confidence");
        let null = FieldValue::Null;
        assert!(!Predicate::compile(Operator::Gt, &json!(0.1), &field).expect("gt").test(&null));
        assert!(!Predicate::compile(Operator::Eq, &json!(0.5), &field).expect("eq").test(&null));
        assert!(Predicate::compile(Operator::Ne, &json!(0.5), &field).expect("ne").test(&null));
    }

    #[test]
    fn range_operators_on_numbers() {
        let field = edge_field("confidence");
        let gte = Predicate::compile(Operator::Gte, &json!(0.7), &field).expect("gte");
        assert!(gte.test(&FieldValue::Float(0.7)));
        assert!(!gte.test(&FieldValue::Float(0.69)));
        let lt = Predicate::compile(Operator::Lt, &json!(1), &field).expect("lt");
        assert!(lt.test(&FieldValue::Float(0.99)));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let confidence = edge_field("confidence");
        assert!(Predicate::compile(Operator::Gt, &json!("high"), &confidence).is_err());
        assert!(Predicate::compile(Operator::Eq, &json!("0.5"), &confidence).is_err());
        assert!(Predicate::compile(Operator::In, &json!("treats"), &edge_field("relation_type")).is_err());
        assert!(Predicate::compile(Operator::Eq, &json!(1), &node_field("name")).is_err());
        assert!(Predicate::compile(Operator::Eq, &json!({}), &node_field("properties")).is_err());
    }

    #[test]
    fn vocabulary_values_are_checked_and_canonicalized() {
        let field = edge_field("relation_type");
        let p = Predicate::compile(Operator::In, &json!(["TREATS", "co_occurrence"]), &field)
            .expect("in");
        assert!(p.test(&FieldValue::from("co_occurs_with")));
        let err = Predicate::compile(Operator::Eq, &json!("heals"), &field).expect_err("unknown");
        assert!(matches!(
            err,
            ProvGraphError::Validation { field: Some(ref f), .. } if f == "relation_type"
        ));
    }

    #[test]
    fn regex_is_case_insensitive_and_bounded() {
        let field = node_field("name");
        let p = Predicate::compile(Operator::Regex, &json!("^tamox"), &field).expect("regex");
        assert!(p.test(&FieldValue::from("Tamoxifen")));
        let long = "a".repeat(MAX_REGEX_PATTERN_LENGTH + 1);
        assert!(Predicate::compile(Operator::Regex, &json!(long), &field).is_err());
        assert!(Predicate::compile(Operator::Regex, &json!("(unclosed"), &field).is_err());
    }

    #[test]
    fn contains_on_text_is_substring() {
        let p = Predicate::compile(Operator::Contains, &json!("CANCER"), &node_field("name"))
            .expect("contains");
        assert!(p.test(&FieldValue::from("Breast cancer")));
        assert!(Predicate::compile(Operator::Contains, &json!(1), &edge_field("confidence")).is_err());
    }
}
