//! # provgraph
//!
//! Library surface of the provgraph binary: the HTTP API, the CLI and
//! configuration loading. All query semantics live in `provgraph-core`;
//! this crate only frames Query/Result documents for transport.

pub mod api;
pub mod cli;
pub mod config;
