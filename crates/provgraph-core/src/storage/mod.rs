//! # Persistent Storage
//!
//! redb-backed implementation of [`crate::graph::GraphStore`].

mod redb_graph;

pub use redb_graph::{ImportSummary, RedbGraph, RedbReader};
