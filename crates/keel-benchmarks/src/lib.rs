//! Keel benchmarking suite
//!
//! Benchmarks for feature identity derivation, lining up resolved configs
//! and the feature-pack merge algebra.

pub mod common;

pub use common::*;
