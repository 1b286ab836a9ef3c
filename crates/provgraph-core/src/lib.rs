//! # provgraph-core
//!
//! The provenance-aware graph query engine.
//!
//! A [`Query`] describes a graph pattern (nodes, single-hop edges or
//! multi-hop paths) with filters, aggregation, ordering and pagination.
//! The engine validates it against the [`SchemaRegistry`], compiles it into
//! an [`ExecutionPlan`] and runs it inside one read snapshot of a
//! [`GraphStore`]: the in-memory [`Graph`] or the redb-backed [`RedbGraph`].
//!
//! ## Data Model
//!
//! Edges come in three layers:
//! - Extraction: raw NER / relation output with a per-mention confidence
//! - Claim: an asserted relationship backed by evidence, whose confidence is
//!   the study-design-weighted average of that evidence
//! - Evidence-support: links an `evidence_line` entity to a claim edge
//!
//! ## Architectural Constraints
//!
//! - Read-only: a query never mutates the graph
//! - Deterministic: BTreeMap storage, ties broken by id
//! - Bounded: `max_hops`, `limit` and a traversal state budget cap every query
//! - NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod backend;
mod cache;
pub mod confidence;
pub mod config;
pub mod context;
pub mod dataset;
pub mod engine;
mod executor;
mod field;
mod filter;
pub mod graph;
mod matcher;
pub mod planner;
pub mod primitives;
pub mod query;
pub mod result;
mod row;
pub mod schema;
mod similarity;
pub mod storage;
mod traversal;
pub mod types;
pub mod value;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ClaimEdge, Direction, Edge, EdgeId, EdgeKind, EdgeLayer, EdgeTarget, Entity, EntityId,
    EntityType, Evidence, ExecutionFault, ExtractionEdge, ExtractionMethod, Extractor,
    Probability, ProvGraphError, RelationType, SectionType, Strength, StudyType, SupportEdge,
};

// =============================================================================
// RE-EXPORTS: Query Language
// =============================================================================

pub use query::{
    AggFunc, AggregationSpec, EdgePattern, Filter, FindType, NodePattern, Operator, OrderBy,
    PathPattern, PathStep, Query, SortDirection, VectorSearch,
};
pub use schema::SchemaRegistry;

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use backend::{BackendReader, StorageBackend};
pub use confidence::{WeightTable, truncate_confidence, weighted_confidence};
pub use config::{EngineConfig, Limits};
pub use context::{CancelToken, ExecutionContext};
pub use dataset::{Dataset, EdgeRecord};
pub use engine::{QueryEngine, StoreStats};
pub use graph::{Graph, GraphRead, GraphStore};
pub use planner::{ExecutionPlan, Planner};
pub use result::{ErrorBody, ErrorDetail, QueryResult, ResultMetadata, ResultRow};
pub use storage::{ImportSummary, RedbGraph};
pub use value::FieldValue;
