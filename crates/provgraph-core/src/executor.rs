//! # Plan Executor
//!
//! Runs an [`ExecutionPlan`] against one graph snapshot.
//!
//! Pipeline: match (scan, join or traversal) → filter → aggregate →
//! order (requested keys, then row identity) → paginate → project.
//! `total_results` is counted after filtering/aggregation and before
//! pagination. The deadline is polled every [`CANCEL_CHECK_INTERVAL`]
//! rows and at every traversal frontier pop.

use crate::context::ExecutionContext;
use crate::field::{FieldArena, FieldId};
use crate::graph::GraphRead;
use crate::planner::{AggColumn, AggregatePlan, ExecutionPlan, Output, PlanShape};
use crate::primitives::CANCEL_CHECK_INTERVAL;
use crate::query::{AggFunc, SortDirection};
use crate::result::{QueryResult, ResultRow};
use crate::row::{Bound, Row};
use crate::traversal::traverse;
use crate::types::{EdgeId, Entity, EntityId, ProvGraphError};
use crate::value::FieldValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// ENTITY CACHE
// =============================================================================

/// Per-query memo of entity lookups over one snapshot.
pub(crate) struct EntityCache<'g, G> {
    graph: &'g G,
    memo: BTreeMap<EntityId, Arc<Entity>>,
}

impl<'g, G: GraphRead> EntityCache<'g, G> {
    pub(crate) fn new(graph: &'g G) -> Self {
        Self {
            graph,
            memo: BTreeMap::new(),
        }
    }

    pub(crate) fn graph(&self) -> &'g G {
        self.graph
    }

    pub(crate) fn remember(&mut self, entity: &Arc<Entity>) {
        self.memo
            .entry(entity.id.clone())
            .or_insert_with(|| Arc::clone(entity));
    }

    /// Resolve an endpoint of `edge`. A missing entity is a dangling edge.
    pub(crate) fn get(
        &mut self,
        id: &EntityId,
        edge: &EdgeId,
    ) -> Result<Arc<Entity>, ProvGraphError> {
        if let Some(found) = self.memo.get(id) {
            return Ok(Arc::clone(found));
        }
        let Some(found) = self.graph.entity(id)? else {
            tracing::warn!(edge = %edge, entity = %id, "dangling edge endpoint");
            return Err(ProvGraphError::DataIntegrity(format!(
                "edge '{}' references missing entity '{}'",
                edge, id
            )));
        };
        self.memo.insert(id.clone(), Arc::clone(&found));
        Ok(found)
    }
}

/// Polls the execution context every [`CANCEL_CHECK_INTERVAL`] ticks.
struct Ticker<'c> {
    ctx: &'c ExecutionContext,
    count: usize,
}

impl Ticker<'_> {
    fn tick(&mut self) -> Result<(), ProvGraphError> {
        self.count += 1;
        if self.count.is_multiple_of(CANCEL_CHECK_INTERVAL) {
            self.ctx.check()?;
        }
        Ok(())
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Execute `plan` against `graph`. The result's `query_time_ms` is left for the caller.
pub(crate) fn execute<G: GraphRead>(
    plan: &ExecutionPlan,
    graph: &G,
    ctx: &ExecutionContext,
) -> Result<QueryResult, ProvGraphError> {
    ctx.check()?;
    let mut ticker = Ticker { ctx, count: 0 };
    let mut entities = EntityCache::new(graph);

    let matched = match_rows(plan, &mut entities, &mut ticker, ctx)?;
    let matched_count = matched.len();

    let mut rows = Vec::with_capacity(matched.len());
    for row in matched {
        ticker.tick()?;
        if plan.filters.iter().all(|f| f.test(&plan.fields, &row)) {
            rows.push(row);
        }
    }

    let result = match &plan.output {
        Output::Rows { order, projection } => {
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                ticker.tick()?;
                let keys: Vec<FieldValue> =
                    order.iter().map(|(id, _)| plan.fields.eval(*id, &row)).collect();
                keyed.push((keys, row.identity(), row));
            }
            let directions: Vec<SortDirection> = order.iter().map(|(_, d)| *d).collect();
            keyed.sort_by(|a, b| {
                compare_keys(&a.0, &b.0, &directions).then_with(|| a.1.cmp(&b.1))
            });
            let total = keyed.len();
            let page = keyed
                .into_iter()
                .skip(plan.offset)
                .take(plan.limit)
                .map(|(_, _, row)| project_row(&plan.fields, projection, &row))
                .collect();
            QueryResult::page(page, total, plan.offset)
        }
        Output::Groups {
            aggregate,
            order,
            projection,
        } => {
            let mut groups = aggregate_rows(aggregate, &plan.fields, &rows, &mut ticker)?;
            let group_width = aggregate.group_by.len();
            let directions: Vec<SortDirection> = order.iter().map(|(_, d)| *d).collect();
            groups.sort_by(|a, b| {
                let ka: Vec<FieldValue> = order.iter().map(|(i, _)| column(a, *i)).collect();
                let kb: Vec<FieldValue> = order.iter().map(|(i, _)| column(b, *i)).collect();
                compare_keys(&ka, &kb, &directions)
                    .then_with(|| compare_prefix(a, b, group_width))
            });
            let total = groups.len();
            let page = groups
                .into_iter()
                .skip(plan.offset)
                .take(plan.limit)
                .map(|values| {
                    projection
                        .iter()
                        .filter_map(|i| {
                            let name = aggregate.names.get(*i)?;
                            Some((name.clone(), column(&values, *i).to_json()))
                        })
                        .collect::<ResultRow>()
                })
                .collect();
            QueryResult::page(page, total, plan.offset)
        }
    };

    tracing::debug!(
        find = plan.find.as_str(),
        matched = matched_count,
        total = result.metadata.total_results,
        returned = result.results.len(),
        "query executed"
    );
    Ok(result)
}

fn match_rows<G: GraphRead>(
    plan: &ExecutionPlan,
    entities: &mut EntityCache<'_, G>,
    ticker: &mut Ticker<'_>,
    ctx: &ExecutionContext,
) -> Result<Vec<Row>, ProvGraphError> {
    let width = plan.bindings.width();
    let graph = entities.graph();
    let mut rows = Vec::new();

    match &plan.shape {
        PlanShape::NodeScan { node, slot } => {
            for entity in node.candidates(graph)? {
                ticker.tick()?;
                let mut row = Row::new(width);
                row.set(*slot, Bound::Node(entity));
                rows.push(row);
            }
        }
        PlanShape::Join(join) => {
            for anchor in join.anchor.candidates(graph)? {
                entities.remember(&anchor);
                for (edge, neighbor) in join.edge.expand(graph, &anchor.id)? {
                    ticker.tick()?;
                    let source = entities.get(&edge.source_id, &edge.id)?;
                    let mut row = Row::new(width);
                    row.set(join.anchor_slot, Bound::Node(Arc::clone(&anchor)));
                    if let Some(target) = edge.target_entity() {
                        let target = entities.get(target, &edge.id)?;
                        row.set(join.target_slot, Bound::Node(target));
                    }
                    if let Some(neighbor) = neighbor {
                        let neighbor = entities.get(&neighbor, &edge.id)?;
                        row.set(join.neighbor_slot, Bound::Node(neighbor));
                    }
                    row.set(join.source_slot, Bound::Node(source));
                    row.set(join.edge_slot, Bound::Edge(edge));
                    rows.push(row);
                }
            }
        }
        PlanShape::EdgeScan(scan) => {
            for edge in graph.edges()? {
                ticker.tick()?;
                if !scan.edge.matches(&edge) {
                    continue;
                }
                let mut row = Row::new(width);
                row.set(
                    scan.source_slot,
                    Bound::Node(entities.get(&edge.source_id, &edge.id)?),
                );
                if let Some(target) = edge.target_entity() {
                    row.set(scan.target_slot, Bound::Node(entities.get(target, &edge.id)?));
                }
                row.set(scan.edge_slot, Bound::Edge(edge));
                rows.push(row);
            }
        }
        PlanShape::Traversal(traversal) => {
            rows = traverse(traversal, width, entities, ctx)?;
        }
    }
    Ok(rows)
}

// =============================================================================
// ORDERING & PROJECTION
// =============================================================================

fn compare_keys(a: &[FieldValue], b: &[FieldValue], directions: &[SortDirection]) -> Ordering {
    for ((x, y), direction) in a.iter().zip(b).zip(directions) {
        let ord = match direction {
            SortDirection::Asc => x.total_cmp(y),
            SortDirection::Desc => y.total_cmp(x),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_prefix(a: &[FieldValue], b: &[FieldValue], width: usize) -> Ordering {
    for (x, y) in a.iter().zip(b).take(width) {
        let ord = x.total_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn column(values: &[FieldValue], i: usize) -> FieldValue {
    values.get(i).cloned().unwrap_or(FieldValue::Null)
}

fn project_row(
    fields: &FieldArena,
    projection: &[(String, FieldId)],
    row: &Row,
) -> ResultRow {
    projection
        .iter()
        .map(|(name, id)| (name.clone(), fields.eval(*id, row).to_json()))
        .collect()
}

// =============================================================================
// AGGREGATION
// =============================================================================

#[derive(Debug, Default)]
struct Accumulator {
    rows: usize,
    items: Vec<FieldValue>,
}

/// Group rows and fold each aggregate. Output rows are group values
/// followed by aggregate values, in plan column order.
fn aggregate_rows(
    plan: &AggregatePlan,
    fields: &FieldArena,
    rows: &[Row],
    ticker: &mut Ticker<'_>,
) -> Result<Vec<Vec<FieldValue>>, ProvGraphError> {
    let mut groups: BTreeMap<Vec<FieldValue>, Vec<Accumulator>> = BTreeMap::new();
    for row in rows {
        ticker.tick()?;
        let key: Vec<FieldValue> = plan.group_by.iter().map(|id| fields.eval(*id, row)).collect();
        let accs = groups.entry(key).or_insert_with(|| {
            plan.columns
                .iter()
                .map(|_| Accumulator::default())
                .collect()
        });
        for (acc, col) in accs.iter_mut().zip(&plan.columns) {
            acc.rows += 1;
            if let Some(id) = col.field {
                let value = fields.eval(id, row);
                acc.items.extend(value.flatten().into_iter().cloned());
            }
        }
    }

    // Without group_by an empty input still yields one row of aggregates.
    if groups.is_empty() && plan.group_by.is_empty() {
        groups.insert(
            Vec::new(),
            plan.columns.iter().map(|_| Accumulator::default()).collect(),
        );
    }

    Ok(groups
        .into_iter()
        .map(|(mut key, accs)| {
            key.extend(
                accs.iter()
                    .zip(&plan.columns)
                    .map(|(acc, col)| fold(col, acc)),
            );
            key
        })
        .collect())
}

fn fold(column: &AggColumn, acc: &Accumulator) -> FieldValue {
    match column.function {
        AggFunc::Count => {
            let n = if column.field.is_some() {
                acc.items.len()
            } else {
                acc.rows
            };
            FieldValue::Int(n as i64)
        }
        AggFunc::Sum => sum(&acc.items),
        AggFunc::Avg => {
            let numbers: Vec<f64> = acc.items.iter().filter_map(FieldValue::as_f64).collect();
            if numbers.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggFunc::Min => acc
            .items
            .iter()
            .min_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(FieldValue::Null),
        AggFunc::Max => acc
            .items
            .iter()
            .max_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(FieldValue::Null),
    }
}

/// Integer sum while every item is an integer and it fits, float otherwise.
fn sum(items: &[FieldValue]) -> FieldValue {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    let mut seen = false;
    for item in items {
        match item {
            FieldValue::Int(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
                seen = true;
            }
            FieldValue::Float(f) => {
                int_total = None;
                float_total += f;
                seen = true;
            }
            _ => {}
        }
    }
    match (seen, int_total) {
        (false, _) => FieldValue::Null,
        (true, Some(total)) => FieldValue::Int(total),
        (true, None) => FieldValue::Float(float_total),
    }
}

// =============================================================================
// TESTS
// =============================================================================
