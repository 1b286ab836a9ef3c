//! # Query Benchmarks
//!
//! Performance benchmarks for provgraph-core planning and execution.
//!
//! Run with: `cargo bench -p provgraph-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use provgraph_core::{
    ClaimEdge, Edge, EdgePattern, Entity, EntityType, Evidence, ExtractionMethod, Graph,
    NodePattern, PathPattern, Probability, Query, QueryEngine, RelationType, SectionType,
    StudyType, WeightTable,
};
use std::hint::black_box;

fn claim(id: String, from: String, to: String, confidence: f64) -> Edge {
    let evidence = Evidence::new(
        "pmid:1",
        SectionType::Results,
        ExtractionMethod::Llm,
        Probability::new(confidence).expect("probability"),
    )
    .with_study_type(StudyType::Cohort);
    let claim = ClaimEdge::new(vec![evidence], &WeightTable::default()).expect("claim");
    Edge::claim(id, from, to, RelationType::Treats, claim)
}

/// Create a graph with N nodes and claim edges between consecutive nodes.
fn create_linear_graph(size: usize) -> Graph {
    let mut graph = Graph::new();
    for i in 0..size {
        graph
            .insert_entity(Entity::new(format!("n{:06}", i), EntityType::Drug, format!("N{}", i)))
            .expect("insert");
    }
    for i in 1..size {
        graph
            .insert_edge(claim(
                format!("e{:06}", i),
                format!("n{:06}", i - 1),
                format!("n{:06}", i),
                0.9,
            ))
            .expect("edge");
    }
    graph
}

/// Create a graph where every node links to the next `fanout` nodes.
fn create_mesh_graph(size: usize, fanout: usize) -> Graph {
    let mut graph = Graph::new();
    for i in 0..size {
        graph
            .insert_entity(Entity::new(format!("n{:06}", i), EntityType::Drug, format!("N{}", i)))
            .expect("insert");
    }
    for i in 0..size {
        for k in 1..=fanout {
            let j = (i + k) % size;
            graph
                .insert_edge(claim(
                    format!("e{:06}-{:06}", i, j),
                    format!("n{:06}", i),
                    format!("n{:06}", j),
                    0.5 + (k as f64) / (2.0 * fanout as f64),
                ))
                .expect("edge");
        }
    }
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_plan(c: &mut Criterion) {
    let engine = QueryEngine::new(Graph::new());
    let query = Query::nodes(NodePattern::of_type(EntityType::Drug))
        .with_edge(EdgePattern::of_relation(RelationType::Treats).min_confidence(0.7));

    c.bench_function("plan_cached", |b| {
        b.iter(|| black_box(engine.plan(&query)));
    });
}

fn bench_single_hop_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_hop_join");

    for size in [100, 1000, 10000].iter() {
        let engine = QueryEngine::new(create_linear_graph(*size));
        let query = Query::nodes(NodePattern::of_type(EntityType::Drug))
            .with_edge(EdgePattern::of_relation(RelationType::Treats).min_confidence(0.7))
            .limit(100);

        group.bench_with_input(BenchmarkId::from_parameter(size), &query, |b, query| {
            b.iter(|| black_box(engine.execute(query)));
        });
    }

    group.finish();
}

fn bench_path_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_expansion");

    for size in [100, 500, 1000].iter() {
        let engine = QueryEngine::new(create_mesh_graph(*size, 3));

        for max_hops in [2usize, 4] {
            let query = Query::paths(
                PathPattern::from(NodePattern::any().with_id("n000000")).max_hops(max_hops),
            )
            .limit(1000);
            group.bench_with_input(
                BenchmarkId::new(format!("hops_{}", max_hops), size),
                &query,
                |b, query| {
                    b.iter(|| black_box(engine.execute(query)));
                },
            );
        }
    }

    group.finish();
}

fn bench_shortest_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("shortest_path");

    for size in [100, 500, 1000].iter() {
        let engine = QueryEngine::new(create_mesh_graph(*size, 3));
        let query = Query::paths(
            PathPattern::from(NodePattern::any().with_id("n000000"))
                .ending_at(NodePattern::any().with_id(format!("n{:06}", 9)))
                .max_hops(5)
                .shortest(),
        );

        group.bench_with_input(BenchmarkId::from_parameter(size), &query, |b, query| {
            b.iter(|| black_box(engine.execute(query)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_plan,
    bench_single_hop_join,
    bench_path_expansion,
    bench_shortest_path
);
criterion_main!(benches);
