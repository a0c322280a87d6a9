//! keel benchmarking suite
//!
//! Benchmarks for catalog indexing, manifest parsing and closure
//! computation over synthetic feature graphs.

pub mod common;

pub use common::*;
