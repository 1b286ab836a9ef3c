//! JSON to [`Query`] parsing with strict key validation.
//!
//! Every object is checked against the key list of its
//! [`PatternObject`] before any value is read, so a typo anywhere in a
//! query fails with the dotted path of the offending key and the keys that
//! would have been accepted.

use super::{
    AggFunc, AggregationSpec, EdgePattern, Filter, FindType, NamedAggregation, NodePattern,
    Operator, OrderBy, PathPattern, PathStep, Query, SortDirection, VectorSearch,
};
use crate::primitives::DEFAULT_MAX_HOPS;
use crate::schema::PatternObject;
use crate::types::{EntityId, ProvGraphError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

type Object = Map<String, Value>;

/// Parse and validate a JSON query document.
pub fn parse_query(value: &Value) -> Result<Query, ProvGraphError> {
    let map = object(value, "query", PatternObject::Query)?;

    let find = match map.get("find") {
        Some(v) => parse_enum::<FindType>(v, "find")?,
        None => {
            return Err(ProvGraphError::Validation {
                message: "Missing required field 'find'".to_string(),
                field: Some("find".to_string()),
                allowed: FindType::labels(),
            });
        }
    };

    let node_pattern = map
        .get("node_pattern")
        .map(|v| parse_node(v, "node_pattern"))
        .transpose()?;
    let edge_pattern = map
        .get("edge_pattern")
        .map(|v| parse_edge(v, "edge_pattern"))
        .transpose()?;
    let path_pattern = map
        .get("path_pattern")
        .map(|v| parse_path(v, "path_pattern"))
        .transpose()?;
    let filters = match map.get("filters") {
        Some(v) => parse_filters(v, "filters")?,
        None => Vec::new(),
    };
    let aggregate = map
        .get("aggregate")
        .map(|v| parse_aggregate(v, "aggregate"))
        .transpose()?;
    let order_by = match map.get("order_by") {
        Some(v) => parse_order_by(v, "order_by")?,
        None => Vec::new(),
    };

    Ok(Query {
        find,
        node_pattern,
        edge_pattern,
        path_pattern,
        filters,
        aggregate,
        order_by,
        limit: get_usize(map, "limit", "")?,
        offset: get_usize(map, "offset", "")?.unwrap_or(0),
        return_fields: match map.get("return_fields") {
            Some(v) => string_list(v, "return_fields")?,
            None => Vec::new(),
        },
    })
}

// =============================================================================
// PATTERNS
// =============================================================================

fn parse_node(value: &Value, path: &str) -> Result<NodePattern, ProvGraphError> {
    let map = object(value, path, PatternObject::NodePattern)?;
    let mut pattern = NodePattern::default();

    for key in ["type", "types", "node_type", "node_types"] {
        if let Some(v) = map.get(key) {
            for t in enum_list(v, &join(path, key))? {
                if !pattern.types.contains(&t) {
                    pattern.types.push(t);
                }
            }
        }
    }
    pattern.id = get_str(map, "id", path)?.map(EntityId::new);
    if let Some(v) = map.get("name") {
        pattern.names = string_list(v, &join(path, "name"))?;
    }
    pattern.name_pattern = get_str(map, "name_pattern", path)?.map(str::to_string);
    if let Some(v) = map.get("external_ids") {
        let field = join(path, "external_ids");
        let ids = v
            .as_object()
            .ok_or_else(|| type_error(&field, "an object"))?;
        for (ontology, code) in ids {
            let code = code
                .as_str()
                .ok_or_else(|| type_error(&join(&field, ontology), "a string"))?;
            pattern
                .external_ids
                .insert(ontology.clone(), code.to_string());
        }
    }
    if let Some(v) = map.get("properties") {
        let field = join(path, "properties");
        let props = v
            .as_object()
            .ok_or_else(|| type_error(&field, "an object"))?;
        pattern.properties = props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>();
    }
    if let Some(v) = map.get("property_filters") {
        pattern.property_filters = parse_filters(v, &join(path, "property_filters"))?;
    }
    pattern.vector_search = map
        .get("vector_search")
        .map(|v| parse_vector_search(v, &join(path, "vector_search")))
        .transpose()?;
    pattern.var = get_var(map, path)?;
    Ok(pattern)
}

/// A bare embedding array, or an object carrying one with its limits.
fn parse_vector_search(value: &Value, path: &str) -> Result<VectorSearch, ProvGraphError> {
    if value.is_array() {
        return Ok(VectorSearch::new(number_list(value, path)?));
    }
    let map = object(value, path, PatternObject::VectorSearch)?;
    if map.contains_key("text") {
        return Err(ProvGraphError::UnsupportedFeature(format!(
            "{}.text: the engine does not embed text; supply 'embedding'",
            path
        )));
    }
    let embedding = ["embedding", "vector"]
        .into_iter()
        .find_map(|key| map.get(key).map(|v| number_list(v, &join(path, key))))
        .ok_or_else(|| missing(path, "embedding"))??;
    let mut min_similarity = get_f64(map, "min_similarity", path)?;
    if min_similarity.is_none() {
        min_similarity = get_f64(map, "similarity_threshold", path)?;
    }
    Ok(VectorSearch {
        embedding,
        top_k: get_usize(map, "top_k", path)?,
        min_similarity,
    })
}

fn parse_edge(value: &Value, path: &str) -> Result<EdgePattern, ProvGraphError> {
    let map = object(value, path, PatternObject::EdgePattern)?;
    let mut pattern = EdgePattern::default();

    for key in ["relation_type", "relation_types"] {
        if let Some(v) = map.get(key) {
            for r in enum_list(v, &join(path, key))? {
                if !pattern.relation_types.contains(&r) {
                    pattern.relation_types.push(r);
                }
            }
        }
    }
    if let Some(v) = map.get("direction") {
        pattern.direction = parse_enum(v, &join(path, "direction"))?;
    }
    if let Some(v) = map.get("layer") {
        pattern.layer = parse_enum(v, &join(path, "layer"))?;
    }
    pattern.min_confidence = get_f64(map, "min_confidence", path)?;
    if let Some(v) = map.get("property_filters") {
        pattern.property_filters = parse_filters(v, &join(path, "property_filters"))?;
    }
    pattern.min_evidence_count = get_usize(map, "min_evidence_count", path)?;
    if let Some(v) = map.get("require_evidence_from") {
        pattern.require_evidence_from = enum_list(v, &join(path, "require_evidence_from"))?;
    }
    pattern.var = get_var(map, path)?;
    Ok(pattern)
}

fn parse_path(value: &Value, path: &str) -> Result<PathPattern, ProvGraphError> {
    let map = object(value, path, PatternObject::PathPattern)?;

    let start = match map.get("start") {
        Some(v) => parse_node(v, &join(path, "start"))?,
        None => {
            return Err(ProvGraphError::Validation {
                message: "Missing required field 'start'".to_string(),
                field: Some(join(path, "start")),
                allowed: Vec::new(),
            });
        }
    };

    let mut steps = Vec::new();
    for key in ["steps", "edges"] {
        if let Some(v) = map.get(key) {
            let field = join(path, key);
            let items = v
                .as_array()
                .ok_or_else(|| type_error(&field, "an array"))?;
            for (i, item) in items.iter().enumerate() {
                steps.push(parse_step(item, &format!("{}[{}]", field, i))?);
            }
        }
    }

    let shortest_path = get_bool(map, "shortest_path", path)?.unwrap_or(false);
    Ok(PathPattern {
        start,
        steps,
        end: map
            .get("end")
            .map(|v| parse_node(v, &join(path, "end")))
            .transpose()?,
        max_hops: get_usize(map, "max_hops", path)?.unwrap_or(DEFAULT_MAX_HOPS),
        avoid_cycles: get_bool(map, "avoid_cycles", path)?.unwrap_or(true),
        shortest_path,
        all_paths: get_bool(map, "all_paths", path)?.unwrap_or(!shortest_path),
    })
}

/// A step is `{edge, node}` or the pair `[edge, node]`.
fn parse_step(value: &Value, path: &str) -> Result<PathStep, ProvGraphError> {
    match value {
        Value::Array(pair) if pair.len() == 2 => Ok(PathStep {
            edge: parse_edge(&pair[0], &format!("{}[0]", path))?,
            node: parse_node(&pair[1], &format!("{}[1]", path))?,
        }),
        Value::Object(_) => {
            let map = object(value, path, PatternObject::PathStep)?;
            Ok(PathStep {
                edge: map
                    .get("edge")
                    .map(|v| parse_edge(v, &join(path, "edge")))
                    .transpose()?
                    .unwrap_or_default(),
                node: map
                    .get("node")
                    .map(|v| parse_node(v, &join(path, "node")))
                    .transpose()?
                    .unwrap_or_default(),
            })
        }
        _ => Err(type_error(path, "an {edge, node} object or [edge, node] pair")),
    }
}

// =============================================================================
// FILTERS, AGGREGATION, ORDERING
// =============================================================================

fn parse_filters(value: &Value, path: &str) -> Result<Vec<Filter>, ProvGraphError> {
    let items = value
        .as_array()
        .ok_or_else(|| type_error(path, "an array"))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_filter(item, &format!("{}[{}]", path, i)))
        .collect()
}

/// A filter is `{field, operator, value}` or the triple `[field, operator, value]`.
fn parse_filter(value: &Value, path: &str) -> Result<Filter, ProvGraphError> {
    if let Value::Array(triple) = value {
        if triple.len() != 3 {
            return Err(type_error(path, "a [field, operator, value] triple"));
        }
        let field = triple[0]
            .as_str()
            .ok_or_else(|| type_error(&format!("{}[0]", path), "a string"))?;
        let operator = parse_enum::<Operator>(&triple[1], &format!("{}[1]", path))?;
        return Ok(Filter::new(field, operator, triple[2].clone()));
    }

    let map = object(value, path, PatternObject::Filter)?;
    let field = get_str(map, "field", path)?.ok_or_else(|| missing(path, "field"))?;
    let operator = match (map.get("operator"), map.get("op")) {
        (Some(v), _) => parse_enum::<Operator>(v, &join(path, "operator"))?,
        (None, Some(v)) => parse_enum::<Operator>(v, &join(path, "op"))?,
        (None, None) => return Err(missing(path, "operator")),
    };
    let value = map.get("value").ok_or_else(|| missing(path, "value"))?;
    Ok(Filter::new(field, operator, value.clone()))
}

fn parse_aggregate(value: &Value, path: &str) -> Result<AggregationSpec, ProvGraphError> {
    let map = object(value, path, PatternObject::Aggregate)?;
    let group_by = match map.get("group_by") {
        Some(v) => string_list(v, &join(path, "group_by"))?,
        None => Vec::new(),
    };

    let mut aggregations = Vec::new();
    if let Some(v) = map.get("aggregations") {
        let field = join(path, "aggregations");
        let named = v
            .as_object()
            .ok_or_else(|| type_error(&field, "an object of named aggregations"))?;
        for (name, spec) in named {
            aggregations.push(parse_aggregation(name, spec, &join(&field, name))?);
        }
    }

    Ok(AggregationSpec {
        group_by,
        aggregations,
    })
}

/// `[function, field]`, `[function]` (row count), or `{function, field}`.
fn parse_aggregation(
    name: &str,
    value: &Value,
    path: &str,
) -> Result<NamedAggregation, ProvGraphError> {
    let (function, field) = match value {
        Value::Array(items) if matches!(items.len(), 1 | 2) => {
            let function = parse_enum::<AggFunc>(&items[0], &format!("{}[0]", path))?;
            let field = match items.get(1) {
                Some(f) => f
                    .as_str()
                    .ok_or_else(|| type_error(&format!("{}[1]", path), "a string"))?
                    .to_string(),
                None => "*".to_string(),
            };
            (function, field)
        }
        Value::Object(_) => {
            let map = object(value, path, PatternObject::Aggregation)?;
            let function = match map.get("function") {
                Some(f) => parse_enum::<AggFunc>(f, &join(path, "function"))?,
                None => return Err(missing(path, "function")),
            };
            let field = get_str(map, "field", path)?.unwrap_or("*").to_string();
            (function, field)
        }
        _ => return Err(type_error(path, "a [function, field] pair")),
    };
    Ok(NamedAggregation {
        name: name.to_string(),
        function,
        field,
    })
}

/// `order_by` items: `"field"`, `[field, direction]` or `{field, direction}`.
fn parse_order_by(value: &Value, path: &str) -> Result<Vec<OrderBy>, ProvGraphError> {
    let items = value
        .as_array()
        .ok_or_else(|| type_error(path, "an array"))?;
    let mut order = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        let entry = match item {
            Value::String(field) => OrderBy {
                field: field.clone(),
                direction: SortDirection::Asc,
            },
            Value::Array(pair) if matches!(pair.len(), 1 | 2) => OrderBy {
                field: pair[0]
                    .as_str()
                    .ok_or_else(|| type_error(&format!("{}[0]", item_path), "a string"))?
                    .to_string(),
                direction: match pair.get(1) {
                    Some(d) => parse_enum(d, &format!("{}[1]", item_path))?,
                    None => SortDirection::Asc,
                },
            },
            Value::Object(_) => {
                let map = object(item, &item_path, PatternObject::OrderBy)?;
                OrderBy {
                    field: get_str(map, "field", &item_path)?
                        .ok_or_else(|| missing(&item_path, "field"))?
                        .to_string(),
                    direction: match map.get("direction") {
                        Some(d) => parse_enum(d, &join(&item_path, "direction"))?,
                        None => SortDirection::Asc,
                    },
                }
            }
            _ => return Err(type_error(&item_path, "a field name or [field, direction] pair")),
        };
        order.push(entry);
    }
    Ok(order)
}

// =============================================================================
// HELPERS
// =============================================================================

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn type_error(path: &str, expected: &str) -> ProvGraphError {
    ProvGraphError::Validation {
        message: format!("Field '{}' must be {}", path, expected),
        field: Some(path.to_string()),
        allowed: Vec::new(),
    }
}

fn missing(path: &str, key: &str) -> ProvGraphError {
    let field = join(path, key);
    ProvGraphError::Validation {
        message: format!("Missing required field '{}'", field),
        field: Some(field),
        allowed: Vec::new(),
    }
}

/// Borrow `value` as an object whose keys all belong to `kind`.
fn object<'a>(
    value: &'a Value,
    path: &str,
    kind: PatternObject,
) -> Result<&'a Object, ProvGraphError> {
    let map = value
        .as_object()
        .ok_or_else(|| type_error(path, "an object"))?;
    let prefix = if kind == PatternObject::Query { "" } else { path };
    for key in map.keys() {
        if !kind.keys().contains(&key.as_str()) {
            let field = join(prefix, key);
            return Err(ProvGraphError::Validation {
                message: format!("Unknown field '{}'", field),
                field: Some(field),
                allowed: kind.allowed(),
            });
        }
    }
    Ok(map)
}

fn parse_enum<T>(value: &Value, path: &str) -> Result<T, ProvGraphError>
where
    T: FromStr<Err = ProvGraphError>,
{
    value
        .as_str()
        .ok_or_else(|| type_error(path, "a string"))?
        .parse::<T>()
        .map_err(|e| e.at_field(path))
}

/// A single label or an array of labels.
fn enum_list<T>(value: &Value, path: &str) -> Result<Vec<T>, ProvGraphError>
where
    T: FromStr<Err = ProvGraphError>,
{
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| parse_enum(v, &format!("{}[{}]", path, i)))
            .collect(),
        other => Ok(vec![parse_enum(other, path)?]),
    }
}

/// A single string or an array of strings.
fn string_list(value: &Value, path: &str) -> Result<Vec<String>, ProvGraphError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| type_error(&format!("{}[{}]", path, i), "a string"))
            })
            .collect(),
        _ => Err(type_error(path, "a string or array of strings")),
    }
}

fn number_list(value: &Value, path: &str) -> Result<Vec<f64>, ProvGraphError> {
    value
        .as_array()
        .ok_or_else(|| type_error(path, "an array of numbers"))?
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .ok_or_else(|| type_error(&format!("{}[{}]", path, i), "a number"))
        })
        .collect()
}

fn get_str<'a>(map: &'a Object, key: &str, path: &str) -> Result<Option<&'a str>, ProvGraphError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(type_error(&join(path, key), "a string")),
    }
}

fn get_bool(map: &Object, key: &str, path: &str) -> Result<Option<bool>, ProvGraphError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(type_error(&join(path, key), "a boolean")),
    }
}

fn get_f64(map: &Object, key: &str, path: &str) -> Result<Option<f64>, ProvGraphError> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| type_error(&join(path, key), "a number")),
    }
}

fn get_usize(map: &Object, key: &str, path: &str) -> Result<Option<usize>, ProvGraphError> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| type_error(&join(path, key), "a non-negative integer")),
    }
}

fn get_var(map: &Object, path: &str) -> Result<Option<String>, ProvGraphError> {
    let Some(var) = get_str(map, "var", path)? else {
        return Ok(None);
    };
    let mut chars = var.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ProvGraphError::Validation {
            message: format!("Variable name '{}' must be an identifier", var),
            field: Some(join(path, "var")),
            allowed: Vec::new(),
        });
    }
    Ok(Some(var.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, EdgeLayer, EntityType, RelationType, StudyType};
    use serde_json::json;

    fn field_of(err: &ProvGraphError) -> Option<&str> {
        match err {
            ProvGraphError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    #[test]
    fn parses_single_hop_query() {
        let q = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"node_type": "drug", "var": "drug"},
            "edge_pattern": {
                "relation_type": "treats",
                "direction": "outgoing",
                "min_confidence": 0.7
            },
            "filters": [{"field": "target.name", "operator": "eq", "value": "Breast Cancer"}],
            "limit": 10
        }))
        .expect("valid query");

        assert_eq!(q.find, FindType::Nodes);
        let node = q.node_pattern.expect("node");
        assert_eq!(node.types, vec![EntityType::Drug]);
        assert_eq!(node.var.as_deref(), Some("drug"));
        let edge = q.edge_pattern.expect("edge");
        assert_eq!(edge.relation_types, vec![RelationType::Treats]);
        assert_eq!(edge.direction, Direction::Outgoing);
        assert_eq!(edge.layer, EdgeLayer::Claim);
        assert_eq!(edge.min_confidence, Some(0.7));
        assert_eq!(q.filters[0].operator, Operator::Eq);
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn unknown_pattern_key_is_named() {
        let err = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"type": "drug", "invalid_field": 1}
        }))
        .expect_err("unknown key");

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(field_of(&err), Some("node_pattern.invalid_field"));
        assert!(matches!(
            err,
            ProvGraphError::Validation { ref allowed, .. } if allowed.contains(&"name_pattern".to_string())
        ));
    }

    #[test]
    fn unknown_top_level_key_is_named() {
        let err = parse_query(&json!({"find": "nodes", "limt": 5})).expect_err("typo");
        assert_eq!(field_of(&err), Some("limt"));
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let err = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"type": ["drug", "spaceship"]}
        }))
        .expect_err("bad type");
        assert_eq!(field_of(&err), Some("node_pattern.type[1]"));
    }

    #[test]
    fn missing_find_lists_shapes() {
        let err = parse_query(&json!({"node_pattern": {}})).expect_err("no find");
        assert!(matches!(
            err,
            ProvGraphError::Validation { ref allowed, .. } if allowed.len() == FindType::ALL.len()
        ));
    }

    #[test]
    fn path_steps_accept_pair_and_object_forms() {
        let q = parse_query(&json!({
            "find": "paths",
            "path_pattern": {
                "start": {"type": "drug", "name": "Tamoxifen"},
                "steps": [
                    [{"relation_type": "inhibits"}, {"type": "protein"}],
                    {"edge": {"relation_type": "activates"}, "node": {"type": "pathway"}}
                ],
                "max_hops": 2
            }
        }))
        .expect("valid");
        let path = q.path_pattern.expect("path");
        assert_eq!(path.steps.len(), 2);
        assert_eq!(path.steps[1].node.types, vec![EntityType::Pathway]);
        assert_eq!(path.start.names, vec!["Tamoxifen".to_string()]);
        assert!(path.avoid_cycles);
        assert!(path.all_paths);
    }

    #[test]
    fn vector_search_accepts_bare_and_object_forms() {
        let bare = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"vector_search": [0.1, 0.2, 0.3]}
        }))
        .expect("bare");
        let search = bare.node_pattern.and_then(|n| n.vector_search).expect("search");
        assert_eq!(search, VectorSearch::new(vec![0.1, 0.2, 0.3]));

        let full = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {
                "type": "drug",
                "vector_search": {"vector": [1, 0], "top_k": 3, "similarity_threshold": 0.5}
            }
        }))
        .expect("object");
        let search = full.node_pattern.and_then(|n| n.vector_search).expect("search");
        assert_eq!(search, VectorSearch::new(vec![1.0, 0.0]).top_k(3).min_similarity(0.5));
    }

    #[test]
    fn vector_search_shape_errors_are_located() {
        let err = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"vector_search": {"embedding": [0.1, "x"]}}
        }))
        .expect_err("non-numeric");
        assert_eq!(field_of(&err), Some("node_pattern.vector_search.embedding[1]"));

        let err = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"vector_search": {"top_k": 2}}
        }))
        .expect_err("no embedding");
        assert_eq!(field_of(&err), Some("node_pattern.vector_search.embedding"));

        let err = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"vector_search": {"text": "metformin diabetes"}}
        }))
        .expect_err("text");
        assert!(matches!(err, ProvGraphError::UnsupportedFeature(_)));
    }

    #[test]
    fn shortest_path_flips_all_paths_default() {
        let q = parse_query(&json!({
            "find": "paths",
            "path_pattern": {"start": {"id": "a"}, "end": {"id": "b"}, "shortest_path": true}
        }))
        .expect("valid");
        let path = q.path_pattern.expect("path");
        assert!(path.shortest_path);
        assert!(!path.all_paths);
    }

    #[test]
    fn aggregation_forms() {
        let q = parse_query(&json!({
            "find": "edges",
            "edge_pattern": {"var": "rel"},
            "aggregate": {
                "group_by": ["rel.relation_type"],
                "aggregations": {
                    "n": ["count"],
                    "avg_conf": {"function": "mean", "field": "rel.confidence"}
                }
            },
            "order_by": [["avg_conf", "desc"], "n"]
        }))
        .expect("valid");
        let agg = q.aggregate.expect("aggregate");
        assert_eq!(agg.aggregations[0].name, "n");
        assert_eq!(agg.aggregations[0].field, "*");
        assert_eq!(agg.aggregations[1].function, AggFunc::Avg);
        assert_eq!(q.order_by[0].direction, SortDirection::Desc);
        assert_eq!(q.order_by[1].direction, SortDirection::Asc);
    }

    #[test]
    fn filter_triple_and_op_alias() {
        let q = parse_query(&json!({
            "find": "edges",
            "filters": [
                ["edge.confidence", "gte", 0.5],
                {"field": "edge.relation_type", "op": "in", "value": ["treats", "manages"]}
            ]
        }))
        .expect("valid");
        assert_eq!(q.filters[0].operator, Operator::Gte);
        assert_eq!(q.filters[1].operator, Operator::In);
    }

    #[test]
    fn require_evidence_from_parses_study_types() {
        let q = parse_query(&json!({
            "find": "edges",
            "edge_pattern": {"require_evidence_from": ["rct", "meta_analysis"], "min_evidence_count": 2}
        }))
        .expect("valid");
        let edge = q.edge_pattern.expect("edge");
        assert_eq!(
            edge.require_evidence_from,
            vec![StudyType::Rct, StudyType::MetaAnalysis]
        );
        assert_eq!(edge.min_evidence_count, Some(2));
    }

    #[test]
    fn type_mismatches_are_validation_errors() {
        let err = parse_query(&json!({"find": "nodes", "limit": -1})).expect_err("negative");
        assert_eq!(field_of(&err), Some("limit"));
        let err = parse_query(&json!({
            "find": "edges",
            "edge_pattern": {"min_confidence": "high"}
        }))
        .expect_err("string confidence");
        assert_eq!(field_of(&err), Some("edge_pattern.min_confidence"));
        let err = parse_query(&json!({
            "find": "nodes",
            "node_pattern": {"var": "1bad"}
        }))
        .expect_err("bad var");
        assert_eq!(field_of(&err), Some("node_pattern.var"));
    }
}
