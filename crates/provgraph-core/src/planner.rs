//! # Execution Planner
//!
//! Turns a validated [`Query`] into an [`ExecutionPlan`].
//!
//! Planning never touches the store. It:
//! 1. checks limits and shape (`find` vs supplied patterns),
//! 2. binds query variables to row slots,
//! 3. compiles matchers, filters and every referenced field path,
//! 4. resolves ordering, aggregation and projection against the bindings.
//!
//! `nodes`/`edges` become a scan or a single-hop join; `paths` becomes a
//! bounded frontier traversal.

use crate::config::Limits;
use crate::field::{Bindings, FieldArena, FieldId, FieldResolver, Slot};
use crate::filter::CompiledFilter;
use crate::matcher::{EdgeMatcher, NodeMatcher};
use crate::primitives::{
    DEFAULT_EDGE_VAR, DEFAULT_END_VAR, DEFAULT_NODE_VAR, DEFAULT_START_VAR, NEIGHBOR_VAR,
    PATH_VAR, SOURCE_ALIASES, TARGET_ALIASES,
};
use crate::query::{
    AggFunc, AggregationSpec, EdgePattern, FindType, NodePattern, PathPattern, Query,
    SortDirection,
};
use crate::schema::{BindingKind, SchemaRegistry};
use crate::types::{EdgeLayer, ProvGraphError};
use serde_json::{Value, json};

// =============================================================================
// PLAN TYPES
// =============================================================================

/// `(anchor node) -[edge]- (other endpoint)` with explicit endpoint slots.
///
/// `source`/`target` hold the stored endpoints; `neighbor` holds whichever of
/// them the hop reached from the anchor. Support edges point at a claim, so
/// their `target` and `neighbor` stay unbound.
#[derive(Debug, Clone)]
pub(crate) struct JoinPlan {
    pub(crate) anchor: NodeMatcher,
    pub(crate) anchor_slot: Slot,
    pub(crate) edge: EdgeMatcher,
    pub(crate) edge_slot: Slot,
    pub(crate) source_slot: Slot,
    pub(crate) target_slot: Slot,
    pub(crate) neighbor_slot: Slot,
}

/// Every edge of one layer, with its endpoints.
#[derive(Debug, Clone)]
pub(crate) struct EdgeScanPlan {
    pub(crate) edge: EdgeMatcher,
    pub(crate) edge_slot: Slot,
    pub(crate) source_slot: Slot,
    pub(crate) target_slot: Slot,
}

/// One fixed hop of a path pattern.
#[derive(Debug, Clone)]
pub(crate) struct Hop {
    pub(crate) edge: EdgeMatcher,
    pub(crate) node: NodeMatcher,
    pub(crate) edge_slot: Slot,
    pub(crate) node_slot: Slot,
}

#[derive(Debug, Clone)]
pub(crate) enum HopSchedule {
    /// Explicit steps, taken in order.
    Fixed(Vec<Hop>),
    /// The same edge pattern at every hop.
    Variable { edge: EdgeMatcher, end_slot: Slot },
}

#[derive(Debug, Clone)]
pub(crate) struct TraversalPlan {
    pub(crate) start: NodeMatcher,
    pub(crate) start_slot: Slot,
    pub(crate) hops: HopSchedule,
    /// Constraint on the terminal node.
    pub(crate) end: NodeMatcher,
    pub(crate) max_hops: usize,
    pub(crate) avoid_cycles: bool,
    pub(crate) shortest: bool,
    pub(crate) path_slot: Slot,
    pub(crate) max_states: usize,
}

impl TraversalPlan {
    /// Exact length of every emitted path in fixed mode.
    pub(crate) fn fixed_length(&self) -> Option<usize> {
        match &self.hops {
            HopSchedule::Fixed(hops) => Some(hops.len().min(self.max_hops)),
            HopSchedule::Variable { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PlanShape {
    NodeScan { node: NodeMatcher, slot: Slot },
    Join(JoinPlan),
    EdgeScan(EdgeScanPlan),
    Traversal(TraversalPlan),
}

/// An aggregate column; `field: None` counts rows.
#[derive(Debug, Clone)]
pub(crate) struct AggColumn {
    pub(crate) function: AggFunc,
    pub(crate) field: Option<FieldId>,
}

#[derive(Debug, Clone)]
pub(crate) struct AggregatePlan {
    pub(crate) group_by: Vec<FieldId>,
    pub(crate) columns: Vec<AggColumn>,
    /// Output names: group fields, then aggregation names.
    pub(crate) names: Vec<String>,
}

/// Post-match processing.
#[derive(Debug, Clone)]
pub(crate) enum Output {
    Rows {
        order: Vec<(FieldId, SortDirection)>,
        projection: Vec<(String, FieldId)>,
    },
    Groups {
        aggregate: AggregatePlan,
        order: Vec<(usize, SortDirection)>,
        projection: Vec<usize>,
    },
}

/// A compiled, store-independent query plan. Shared through the plan cache.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub(crate) find: FindType,
    pub(crate) bindings: Bindings,
    pub(crate) fields: FieldArena,
    pub(crate) shape: PlanShape,
    pub(crate) filters: Vec<CompiledFilter>,
    pub(crate) output: Output,
    pub(crate) offset: usize,
    pub(crate) limit: usize,
}

impl ExecutionPlan {
    #[must_use]
    pub fn find(&self) -> FindType {
        self.find
    }

    /// Variable names in scope, in declaration order.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        self.bindings.names()
    }

    /// Output column names, in order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        match &self.output {
            Output::Rows { projection, .. } => {
                projection.iter().map(|(name, _)| name.clone()).collect()
            }
            Output::Groups {
                aggregate,
                projection,
                ..
            } => projection
                .iter()
                .filter_map(|i| aggregate.names.get(*i).cloned())
                .collect(),
        }
    }

    /// Human-readable plan summary for `explain`.
    #[must_use]
    pub fn explain(&self) -> Value {
        let strategy = match &self.shape {
            PlanShape::NodeScan { node, .. } => json!({
                "kind": "node_scan",
                "anchor": node.anchor_label(),
            }),
            PlanShape::Join(join) => json!({
                "kind": "single_hop_join",
                "anchor": join.anchor.anchor_label(),
                "direction": join.edge.direction().as_str(),
                "layer": join.edge.layer().as_str(),
            }),
            PlanShape::EdgeScan(scan) => json!({
                "kind": "edge_scan",
                "layer": scan.edge.layer().as_str(),
            }),
            PlanShape::Traversal(t) => {
                let hops: Vec<Value> = match &t.hops {
                    HopSchedule::Fixed(hops) => hops
                        .iter()
                        .take(t.max_hops)
                        .map(|h| {
                            json!({
                                "direction": h.edge.direction().as_str(),
                                "layer": h.edge.layer().as_str(),
                            })
                        })
                        .collect(),
                    HopSchedule::Variable { edge, .. } => vec![json!({
                        "direction": edge.direction().as_str(),
                        "layer": edge.layer().as_str(),
                        "repeat": t.max_hops,
                    })],
                };
                json!({
                    "kind": "frontier_traversal",
                    "mode": if t.fixed_length().is_some() { "fixed" } else { "variable" },
                    "anchor": t.start.anchor_label(),
                    "hops": hops,
                    "max_hops": t.max_hops,
                    "avoid_cycles": t.avoid_cycles,
                    "selection": if t.shortest { "shortest_path" } else { "all_paths" },
                    "state_budget": t.max_states,
                })
            }
        };
        let (order, aggregated) = match &self.output {
            Output::Rows { order, .. } => (
                order
                    .iter()
                    .filter_map(|(id, dir)| {
                        self.fields
                            .get(*id)
                            .map(|f| json!([f.path, dir.as_str()]))
                    })
                    .collect::<Vec<_>>(),
                false,
            ),
            Output::Groups {
                aggregate, order, ..
            } => (
                order
                    .iter()
                    .filter_map(|(i, dir)| {
                        aggregate.names.get(*i).map(|n| json!([n, dir.as_str()]))
                    })
                    .collect(),
                true,
            ),
        };
        json!({
            "find": self.find.as_str(),
            "strategy": strategy,
            "bindings": self.bindings.names(),
            "filters": self.filters.len(),
            "aggregated": aggregated,
            "order_by": order,
            "columns": self.columns(),
            "offset": self.offset,
            "limit": self.limit,
        })
    }
}

// =============================================================================
// PLANNER
// =============================================================================

fn invalid(message: String, field: &str) -> ProvGraphError {
    ProvGraphError::Validation {
        message,
        field: Some(field.to_string()),
        allowed: Vec::new(),
    }
}

/// Compiles queries against the schema registry and engine limits.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    resolver: FieldResolver<'a>,
    limits: &'a Limits,
}

impl<'a> Planner<'a> {
    #[must_use]
    pub fn new(schema: &'a SchemaRegistry, limits: &'a Limits) -> Self {
        Self {
            resolver: FieldResolver::new(schema),
            limits,
        }
    }

    pub fn plan(&self, query: &Query) -> Result<ExecutionPlan, ProvGraphError> {
        let limit = match query.limit {
            Some(limit) if limit > self.limits.max_limit => {
                return Err(invalid(
                    format!("limit {} exceeds the maximum of {}", limit, self.limits.max_limit),
                    "limit",
                ));
            }
            Some(limit) => limit,
            None => self.limits.default_limit,
        };

        let mut bindings = Bindings::default();
        let shape = match query.find {
            FindType::Nodes => self.plan_nodes(query, &mut bindings)?,
            FindType::Edges => self.plan_edges(query, &mut bindings)?,
            FindType::Paths => self.plan_paths(query, &mut bindings)?,
            FindType::Subgraph => {
                if let Some(pattern) = &query.node_pattern {
                    NodeMatcher::compile(pattern, "node_pattern", &self.resolver)?;
                }
                return Err(ProvGraphError::UnsupportedFeature(
                    "find 'subgraph' is not executed by this engine; use 'paths' or 'edges'"
                        .to_string(),
                ));
            }
        };

        let mut fields = FieldArena::default();
        let filters = query
            .filters
            .iter()
            .map(|f| {
                CompiledFilter::compile(f, &mut fields, &bindings, &self.resolver)
                    .map_err(|e| e.at_field("filters"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = match &query.aggregate {
            Some(spec) => self.plan_groups(query, spec, &mut fields, &bindings)?,
            None => self.plan_rows(query, &shape, &mut fields, &bindings)?,
        };

        tracing::debug!(
            find = query.find.as_str(),
            bindings = bindings.width(),
            filters = filters.len(),
            "query plan compiled"
        );

        Ok(ExecutionPlan {
            find: query.find,
            bindings,
            fields,
            shape,
            filters,
            output,
            offset: query.offset,
            limit,
        })
    }

    // -------------------------------------------------------------------------
    // Shapes
    // -------------------------------------------------------------------------

    fn bind_var(
        bindings: &mut Bindings,
        var: Option<&str>,
        default: &str,
        kind: BindingKind,
    ) -> Result<Slot, ProvGraphError> {
        let name = var.unwrap_or(default);
        if name == PATH_VAR && kind != BindingKind::Path {
            return Err(ProvGraphError::Validation {
                message: format!("Variable name '{}' is reserved", PATH_VAR),
                field: Some("var".to_string()),
                allowed: Vec::new(),
            });
        }
        bindings.bind(name, kind)
    }

    fn bind_endpoints(bindings: &mut Bindings) -> Result<(Slot, Slot), ProvGraphError> {
        let [source, subject] = SOURCE_ALIASES;
        let [target, object] = TARGET_ALIASES;
        let source_slot = bindings.bind(source, BindingKind::Node)?;
        bindings.alias(subject, source_slot)?;
        let target_slot = bindings.bind(target, BindingKind::Node)?;
        bindings.alias(object, target_slot)?;
        Ok((source_slot, target_slot))
    }

    /// Let `<var>.similarity` resolve against the pattern's query embedding.
    fn attach_vector(bindings: &mut Bindings, slot: Slot, node: &NodeMatcher) {
        if let Some(query) = node.query_vector() {
            bindings.attach_vector(slot, query);
        }
    }

    /// `top_k` ranks anchors; a pattern checked mid-path has nothing to rank.
    fn reject_top_k(node: &NodeMatcher, prefix: &str) -> Result<(), ProvGraphError> {
        if node.top_k().is_some() {
            return Err(invalid(
                "top_k only applies to node_pattern and path_pattern.start".to_string(),
                &format!("{}.vector_search.top_k", prefix),
            ));
        }
        Ok(())
    }

    fn reject_path_pattern(query: &Query) -> Result<(), ProvGraphError> {
        if query.path_pattern.is_some() {
            return Err(invalid(
                format!("path_pattern requires find 'paths', not '{}'", query.find),
                "path_pattern",
            ));
        }
        Ok(())
    }

    fn plan_nodes(&self, query: &Query, bindings: &mut Bindings) -> Result<PlanShape, ProvGraphError> {
        Self::reject_path_pattern(query)?;
        let default_node = NodePattern::default();
        let pattern = query.node_pattern.as_ref().unwrap_or(&default_node);
        let node = NodeMatcher::compile(pattern, "node_pattern", &self.resolver)?;
        let slot = Self::bind_var(
            bindings,
            pattern.var.as_deref(),
            DEFAULT_NODE_VAR,
            BindingKind::Node,
        )?;
        Self::attach_vector(bindings, slot, &node);

        let Some(edge_pattern) = &query.edge_pattern else {
            return Ok(PlanShape::NodeScan { node, slot });
        };
        let edge = EdgeMatcher::compile(edge_pattern, "edge_pattern", &self.resolver)?;
        let edge_slot = Self::bind_var(
            bindings,
            edge_pattern.var.as_deref(),
            DEFAULT_EDGE_VAR,
            BindingKind::Edge,
        )?;
        let (source_slot, target_slot) = Self::bind_endpoints(bindings)?;
        let neighbor_slot = bindings.bind(NEIGHBOR_VAR, BindingKind::Node)?;
        Ok(PlanShape::Join(JoinPlan {
            anchor: node,
            anchor_slot: slot,
            edge,
            edge_slot,
            source_slot,
            target_slot,
            neighbor_slot,
        }))
    }

    fn plan_edges(&self, query: &Query, bindings: &mut Bindings) -> Result<PlanShape, ProvGraphError> {
        Self::reject_path_pattern(query)?;
        let default_edge = EdgePattern::default();
        let pattern = query.edge_pattern.as_ref().unwrap_or(&default_edge);
        let edge = EdgeMatcher::compile(pattern, "edge_pattern", &self.resolver)?;
        let edge_slot = Self::bind_var(
            bindings,
            pattern.var.as_deref(),
            DEFAULT_EDGE_VAR,
            BindingKind::Edge,
        )?;
        let (source_slot, target_slot) = Self::bind_endpoints(bindings)?;

        let Some(node_pattern) = &query.node_pattern else {
            return Ok(PlanShape::EdgeScan(EdgeScanPlan {
                edge,
                edge_slot,
                source_slot,
                target_slot,
            }));
        };
        let anchor = NodeMatcher::compile(node_pattern, "node_pattern", &self.resolver)?;
        let anchor_slot = Self::bind_var(
            bindings,
            node_pattern.var.as_deref(),
            DEFAULT_NODE_VAR,
            BindingKind::Node,
        )?;
        Self::attach_vector(bindings, anchor_slot, &anchor);
        let neighbor_slot = bindings.bind(NEIGHBOR_VAR, BindingKind::Node)?;
        Ok(PlanShape::Join(JoinPlan {
            anchor,
            anchor_slot,
            edge,
            edge_slot,
            source_slot,
            target_slot,
            neighbor_slot,
        }))
    }

    fn plan_paths(&self, query: &Query, bindings: &mut Bindings) -> Result<PlanShape, ProvGraphError> {
        let Some(pattern) = &query.path_pattern else {
            return Err(invalid(
                "find 'paths' requires a path_pattern".to_string(),
                "path_pattern",
            ));
        };
        for (key, present) in [
            ("node_pattern", query.node_pattern.is_some()),
            ("edge_pattern", query.edge_pattern.is_some()),
        ] {
            if present {
                return Err(invalid(
                    format!("{} is not used by find 'paths'; put it in path_pattern", key),
                    key,
                ));
            }
        }
        self.check_path_pattern(pattern)?;

        let start = NodeMatcher::compile(&pattern.start, "path_pattern.start", &self.resolver)?;
        let start_slot = Self::bind_var(
            bindings,
            pattern.start.var.as_deref(),
            DEFAULT_START_VAR,
            BindingKind::Node,
        )?;
        Self::attach_vector(bindings, start_slot, &start);
        let end = match &pattern.end {
            Some(end) => NodeMatcher::compile(end, "path_pattern.end", &self.resolver)?,
            None => NodeMatcher::any(),
        };
        Self::reject_top_k(&end, "path_pattern.end")?;

        let hops = if pattern.steps.is_empty() {
            let end_slot = Self::bind_var(
                bindings,
                pattern.end.as_ref().and_then(|e| e.var.as_deref()),
                DEFAULT_END_VAR,
                BindingKind::Node,
            )?;
            Self::attach_vector(bindings, end_slot, &end);
            HopSchedule::Variable {
                edge: EdgeMatcher::any_claim(),
                end_slot,
            }
        } else {
            let mut hops = Vec::with_capacity(pattern.steps.len());
            for (i, step) in pattern.steps.iter().enumerate() {
                let prefix = format!("path_pattern.steps[{}]", i);
                if step.edge.layer == EdgeLayer::Evidence {
                    return Err(ProvGraphError::UnsupportedFeature(format!(
                        "{}.edge: evidence-layer edges end at a claim and cannot be traversed",
                        prefix
                    )));
                }
                let edge =
                    EdgeMatcher::compile(&step.edge, &format!("{}.edge", prefix), &self.resolver)?;
                let node =
                    NodeMatcher::compile(&step.node, &format!("{}.node", prefix), &self.resolver)?;
                Self::reject_top_k(&node, &format!("{}.node", prefix))?;
                let edge_slot = Self::bind_var(
                    bindings,
                    step.edge.var.as_deref(),
                    &format!("edge{}", i),
                    BindingKind::Edge,
                )?;
                let node_slot = Self::bind_var(
                    bindings,
                    step.node.var.as_deref(),
                    &format!("node{}", i + 1),
                    BindingKind::Node,
                )?;
                Self::attach_vector(bindings, node_slot, &node);
                hops.push(Hop {
                    edge,
                    node,
                    edge_slot,
                    node_slot,
                });
            }
            // In fixed mode `end` constrains, and may name, the last node taken.
            if let Some(end_pattern) = &pattern.end {
                let last = hops.len().min(pattern.max_hops);
                if let Some(hop) = last.checked_sub(1).and_then(|i| hops.get(i)) {
                    let name = end_pattern.var.as_deref().unwrap_or(DEFAULT_END_VAR);
                    if bindings.lookup(name).is_none() {
                        bindings.alias(name, hop.node_slot)?;
                    }
                    Self::attach_vector(bindings, hop.node_slot, &end);
                }
            }
            HopSchedule::Fixed(hops)
        };

        let path_slot = bindings.bind(PATH_VAR, BindingKind::Path)?;
        Ok(PlanShape::Traversal(TraversalPlan {
            start,
            start_slot,
            hops,
            end,
            max_hops: pattern.max_hops,
            avoid_cycles: pattern.avoid_cycles,
            shortest: pattern.shortest_path,
            path_slot,
            max_states: self.limits.max_traversal_states,
        }))
    }

    fn check_path_pattern(&self, pattern: &PathPattern) -> Result<(), ProvGraphError> {
        if pattern.max_hops == 0 || pattern.max_hops > self.limits.max_hops_limit {
            return Err(invalid(
                format!(
                    "max_hops must be in 1..={}, got {}",
                    self.limits.max_hops_limit, pattern.max_hops
                ),
                "path_pattern.max_hops",
            ));
        }
        if pattern.shortest_path && pattern.all_paths {
            return Err(invalid(
                "shortest_path and all_paths cannot both be true".to_string(),
                "path_pattern.shortest_path",
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    fn plan_rows(
        &self,
        query: &Query,
        shape: &PlanShape,
        fields: &mut FieldArena,
        bindings: &Bindings,
    ) -> Result<Output, ProvGraphError> {
        let mut order = query
            .order_by
            .iter()
            .map(|o| {
                fields
                    .intern(&o.field, bindings, &self.resolver)
                    .map(|id| (id, o.direction))
                    .map_err(|e| e.at_field("order_by"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        // Similarity search ranks by similarity unless told otherwise.
        if order.is_empty()
            && let Some(slot) = anchor_slot(shape)
            && bindings.vector(slot).is_some()
        {
            let path = format!("{}.similarity", slot_name(bindings, slot));
            order.push((fields.intern(&path, bindings, &self.resolver)?, SortDirection::Desc));
        }

        let paths = if query.return_fields.is_empty() {
            default_projection(shape, bindings)
        } else {
            query.return_fields.clone()
        };
        let projection = paths
            .into_iter()
            .map(|path| {
                let id = fields
                    .intern(&path, bindings, &self.resolver)
                    .map_err(|e| e.at_field("return_fields"))?;
                Ok((path, id))
            })
            .collect::<Result<Vec<_>, ProvGraphError>>()?;
        Ok(Output::Rows { order, projection })
    }

    fn plan_groups(
        &self,
        query: &Query,
        spec: &AggregationSpec,
        fields: &mut FieldArena,
        bindings: &Bindings,
    ) -> Result<Output, ProvGraphError> {
        let mut names: Vec<String> = Vec::new();
        let mut group_by = Vec::with_capacity(spec.group_by.len());
        for path in &spec.group_by {
            group_by.push(
                fields
                    .intern(path, bindings, &self.resolver)
                    .map_err(|e| e.at_field("aggregate.group_by"))?,
            );
            names.push(path.clone());
        }

        let mut columns = Vec::with_capacity(spec.aggregations.len());
        for agg in &spec.aggregations {
            let at = format!("aggregate.aggregations.{}", agg.name);
            if names.contains(&agg.name) {
                return Err(invalid(
                    format!("Aggregation name '{}' is already an output column", agg.name),
                    &at,
                ));
            }
            let field = if agg.field == "*" {
                if agg.function != AggFunc::Count {
                    return Err(invalid(
                        format!("'*' is only valid with count, not {}", agg.function),
                        &at,
                    ));
                }
                None
            } else {
                Some(
                    fields
                        .intern(&agg.field, bindings, &self.resolver)
                        .map_err(|e| e.at_field(&at))?,
                )
            };
            columns.push(AggColumn {
                function: agg.function,
                field,
            });
            names.push(agg.name.clone());
        }
        if names.is_empty() {
            return Err(invalid(
                "aggregate needs at least one group_by field or aggregation".to_string(),
                "aggregate",
            ));
        }

        let column = |name: &str, at: &str| {
            names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| ProvGraphError::Validation {
                    message: format!(
                        "'{}' is not an output column of the aggregated query",
                        name
                    ),
                    field: Some(at.to_string()),
                    allowed: names.clone(),
                })
        };
        let order = query
            .order_by
            .iter()
            .map(|o| column(&o.field, "order_by").map(|i| (i, o.direction)))
            .collect::<Result<Vec<_>, _>>()?;
        let projection = if query.return_fields.is_empty() {
            (0..names.len()).collect()
        } else {
            query
                .return_fields
                .iter()
                .map(|f| column(f, "return_fields"))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Output::Groups {
            aggregate: AggregatePlan {
                group_by,
                columns,
                names,
            },
            order,
            projection,
        })
    }
}

fn node_columns(var: &str, out: &mut Vec<String>, with_type: bool) {
    out.push(format!("{}.id", var));
    out.push(format!("{}.name", var));
    if with_type {
        out.push(format!("{}.type", var));
    }
}

fn edge_columns(var: &str, out: &mut Vec<String>) {
    for attr in ["id", "relation_type", "confidence", "evidence_count"] {
        out.push(format!("{}.{}", var, attr));
    }
}

/// Name bound to `slot`, preferring the first declared.
fn slot_name(bindings: &Bindings, slot: Slot) -> String {
    bindings
        .names()
        .into_iter()
        .find(|n| bindings.lookup(n).is_some_and(|(s, _)| s == slot))
        .unwrap_or_default()
}

/// Slot the matcher scans first, when the shape has one.
fn anchor_slot(shape: &PlanShape) -> Option<Slot> {
    match shape {
        PlanShape::NodeScan { slot, .. } => Some(*slot),
        PlanShape::Join(join) => Some(join.anchor_slot),
        PlanShape::Traversal(t) => Some(t.start_slot),
        PlanShape::EdgeScan(_) => None,
    }
}

fn similarity_column(bindings: &Bindings, slot: Slot, out: &mut Vec<String>) {
    if bindings.vector(slot).is_some() {
        out.push(format!("{}.similarity", slot_name(bindings, slot)));
    }
}

fn default_projection(shape: &PlanShape, bindings: &Bindings) -> Vec<String> {
    let mut out = Vec::new();
    match shape {
        PlanShape::NodeScan { slot, .. } => {
            node_columns(&slot_name(bindings, *slot), &mut out, true);
            similarity_column(bindings, *slot, &mut out);
        }
        PlanShape::Join(join) => {
            node_columns(&slot_name(bindings, join.anchor_slot), &mut out, true);
            similarity_column(bindings, join.anchor_slot, &mut out);
            edge_columns(&slot_name(bindings, join.edge_slot), &mut out);
            node_columns(&slot_name(bindings, join.source_slot), &mut out, false);
            node_columns(&slot_name(bindings, join.target_slot), &mut out, false);
        }
        PlanShape::EdgeScan(scan) => {
            edge_columns(&slot_name(bindings, scan.edge_slot), &mut out);
            node_columns(&slot_name(bindings, scan.source_slot), &mut out, false);
            node_columns(&slot_name(bindings, scan.target_slot), &mut out, false);
        }
        PlanShape::Traversal(t) => {
            node_columns(&slot_name(bindings, t.start_slot), &mut out, false);
            similarity_column(bindings, t.start_slot, &mut out);
            let end_slot = match &t.hops {
                HopSchedule::Variable { end_slot, .. } => Some(*end_slot),
                HopSchedule::Fixed(hops) => t
                    .fixed_length()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| hops.get(i))
                    .map(|h| h.node_slot),
            };
            if let Some(slot) = end_slot {
                node_columns(&slot_name(bindings, slot), &mut out, false);
            }
            let path = slot_name(bindings, t.path_slot);
            for attr in ["length", "node_ids", "relation_types"] {
                out.push(format!("{}.{}", path, attr));
            }
        }
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{AggregationSpec, Filter, NodePattern, Operator, PathPattern, VectorSearch};
    use crate::types::{EntityType, RelationType};
    use serde_json::json;

    fn plan(query: &Query) -> Result<ExecutionPlan, ProvGraphError> {
        let schema = SchemaRegistry::new();
        let limits = Limits::default();
        Planner::new(&schema, &limits).plan(query)
    }

    fn field_of(err: &ProvGraphError) -> Option<&str> {
        match err {
            ProvGraphError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    #[test]
    fn node_query_default_columns() {
        let plan = plan(&Query::nodes(NodePattern::of_type(EntityType::Drug))).expect("plan");
        assert_eq!(plan.columns(), vec!["node.id", "node.name", "node.type"]);
        assert_eq!(plan.limit, Limits::default().default_limit);
    }

    #[test]
    fn join_binds_endpoint_aliases() {
        let query = Query::nodes(NodePattern::of_type(EntityType::Drug).bind("drug"))
            .with_edge(EdgePattern::of_relation(RelationType::Treats).bind("rel"))
            .filter(Filter::eq("object.name", json!("Breast Cancer")))
            .returning(&["drug.name", "rel.confidence", "subject.id"]);
        let plan = plan(&query).expect("plan");
        assert_eq!(
            plan.variables(),
            vec!["drug", "rel", "source", "subject", "target", "object", "neighbor"]
        );
        assert_eq!(plan.columns(), vec!["drug.name", "rel.confidence", "subject.id"]);
        assert_eq!(plan.explain()["strategy"]["kind"], "single_hop_join");
    }

    #[test]
    fn unknown_variable_lists_bindings() {
        let query = Query::nodes(NodePattern::any()).returning(&["drug.name"]);
        let err = plan(&query).expect_err("unbound");
        assert!(matches!(
            err,
            ProvGraphError::Validation { ref allowed, .. } if allowed == &vec!["node".to_string()]
        ));
    }

    #[test]
    fn limit_above_maximum_is_rejected() {
        let query = Query::nodes(NodePattern::any()).limit(Limits::default().max_limit + 1);
        assert_eq!(field_of(&plan(&query).expect_err("limit")), Some("limit"));
    }

    #[test]
    fn paths_need_path_pattern() {
        let mut query = Query::nodes(NodePattern::any());
        query.find = FindType::Paths;
        let err = plan(&query).expect_err("missing");
        assert_eq!(field_of(&err), Some("path_pattern"));
    }

    #[test]
    fn hop_bounds_are_checked() {
        for hops in [0, Limits::default().max_hops_limit + 1] {
            let query = Query::paths(PathPattern::from(NodePattern::any()).max_hops(hops));
            assert_eq!(
                field_of(&plan(&query).expect_err("hops")),
                Some("path_pattern.max_hops")
            );
        }
    }

    #[test]
    fn shortest_and_all_paths_conflict() {
        let mut pattern = PathPattern::from(NodePattern::any()).shortest();
        pattern.all_paths = true;
        let err = plan(&Query::paths(pattern)).expect_err("conflict");
        assert_eq!(field_of(&err), Some("path_pattern.shortest_path"));
    }

    #[test]
    fn fixed_path_bindings() {
        let pattern = PathPattern::from(NodePattern::of_type(EntityType::Drug))
            .step(EdgePattern::any(), NodePattern::any())
            .step(EdgePattern::any(), NodePattern::of_type(EntityType::Gene))
            .ending_at(NodePattern::of_type(EntityType::Gene));
        let plan = plan(&Query::paths(pattern)).expect("plan");
        assert_eq!(
            plan.variables(),
            vec!["start", "edge0", "node1", "edge1", "node2", "end", "path"]
        );
        assert_eq!(
            plan.columns(),
            vec![
                "start.id",
                "start.name",
                "node2.id",
                "node2.name",
                "path.length",
                "path.node_ids",
                "path.relation_types"
            ]
        );
    }

    #[test]
    fn variable_path_binds_end() {
        let plan = plan(&Query::paths(PathPattern::from(NodePattern::any()))).expect("plan");
        assert_eq!(plan.variables(), vec!["start", "end", "path"]);
        assert_eq!(plan.explain()["strategy"]["mode"], "variable");
    }

    #[test]
    fn reserved_and_duplicate_vars_are_rejected() {
        let reserved = Query::nodes(NodePattern::any().bind("path"));
        assert_eq!(field_of(&plan(&reserved).expect_err("reserved")), Some("var"));
        let duplicate = Query::nodes(NodePattern::any().bind("x"))
            .with_edge(EdgePattern::any().bind("x"));
        assert_eq!(field_of(&plan(&duplicate).expect_err("duplicate")), Some("var"));
    }

    #[test]
    fn evidence_layer_steps_are_unsupported() {
        let pattern = PathPattern::from(NodePattern::any())
            .step(EdgePattern::any().layer(EdgeLayer::Evidence), NodePattern::any());
        let err = plan(&Query::paths(pattern)).expect_err("evidence step");
        assert!(matches!(err, ProvGraphError::UnsupportedFeature(ref m) if m.contains("steps[0]")));
    }

    #[test]
    fn vector_search_ranks_and_projects_similarity() {
        let search = VectorSearch::new(vec![1.0, 0.0]).top_k(2);
        let plan = plan(&Query::nodes(NodePattern::any().similar_to(search))).expect("plan");
        assert_eq!(
            plan.columns(),
            vec!["node.id", "node.name", "node.type", "node.similarity"]
        );
        let explain = plan.explain();
        assert_eq!(explain["order_by"], json!([["node.similarity", "desc"]]));
        assert_eq!(explain["strategy"]["anchor"], "full_scan + top_2_similar(dim=2)");
    }

    #[test]
    fn similarity_needs_a_vector_search() {
        let query = Query::nodes(NodePattern::any()).returning(&["node.similarity"]);
        assert_eq!(
            field_of(&plan(&query).expect_err("no vector")),
            Some("node.similarity")
        );
    }

    #[test]
    fn vector_search_limits_are_validated() {
        let bad_k = Query::nodes(NodePattern::any().similar_to(VectorSearch::new(vec![1.0]).top_k(0)));
        assert_eq!(
            field_of(&plan(&bad_k).expect_err("top_k")),
            Some("node_pattern.vector_search.top_k")
        );
        let bad_min = Query::nodes(
            NodePattern::any().similar_to(VectorSearch::new(vec![1.0]).min_similarity(1.5)),
        );
        assert_eq!(
            field_of(&plan(&bad_min).expect_err("min_similarity")),
            Some("node_pattern.vector_search.min_similarity")
        );
        let zero = Query::nodes(NodePattern::any().similar_to(VectorSearch::new(vec![0.0, 0.0])));
        assert_eq!(
            field_of(&plan(&zero).expect_err("zero vector")),
            Some("node_pattern.vector_search.embedding")
        );
    }

    #[test]
    fn top_k_is_only_for_anchors() {
        let pattern = PathPattern::from(NodePattern::any()).step(
            EdgePattern::any(),
            NodePattern::any().similar_to(VectorSearch::new(vec![1.0]).top_k(3)),
        );
        assert_eq!(
            field_of(&plan(&Query::paths(pattern)).expect_err("step top_k")),
            Some("path_pattern.steps[0].node.vector_search.top_k")
        );
    }

    #[test]
    fn subgraph_is_unsupported() {
        let err = plan(&Query::subgraph(NodePattern::any())).expect_err("subgraph");
        assert!(matches!(err, ProvGraphError::UnsupportedFeature(_)));
    }

    #[test]
    fn aggregated_order_must_name_output_columns() {
        let spec = AggregationSpec::group_by(&["node.type"]).with("n", AggFunc::Count, "*");
        let ok = Query::nodes(NodePattern::any())
            .aggregate(spec.clone())
            .order_by("n", SortDirection::Desc);
        assert_eq!(plan(&ok).expect("plan").columns(), vec!["node.type", "n"]);

        let bad = Query::nodes(NodePattern::any())
            .aggregate(spec)
            .order_by("node.name", SortDirection::Asc);
        let err = plan(&bad).expect_err("not a column");
        assert!(matches!(
            err,
            ProvGraphError::Validation { ref allowed, .. } if allowed.len() == 2
        ));
    }

    #[test]
    fn star_only_counts() {
        let spec = AggregationSpec::default().with("s", AggFunc::Sum, "*");
        let err = plan(&Query::nodes(NodePattern::any()).aggregate(spec)).expect_err("star");
        assert_eq!(field_of(&err), Some("aggregate.aggregations.s"));
    }

    #[test]
    fn filter_type_mismatch_is_rejected() {
        let query = Query::edges(EdgePattern::any()).filter(Filter::new(
            "edge.confidence",
            Operator::Gt,
            json!("high"),
        ));
        assert!(matches!(
            plan(&query),
            Err(ProvGraphError::Validation { .. })
        ));
    }
}
