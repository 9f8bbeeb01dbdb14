//! Core data types for feature resolution.
//!
//! This module provides the fundamental types used throughout the Keel workspace:
//! - Identifiers for specs, features and feature packs
//! - Feature spec declarations and their registry
//! - Concrete feature configurations

pub mod coord;
pub mod feature;
pub mod id;
pub mod registry;
pub mod spec;

// Re-export all public types
pub use coord::FeaturePackCoord;
pub use feature::FeatureConfig;
pub use id::{FeatureId, FeatureIdBuilder, SpecId, ORIGIN_SEPARATOR};
pub use registry::{validate_reference, FeatureSpecRegistry, FeatureSpecRegistryBuilder};
pub use spec::{FeatureParameterSpec, FeatureReferenceSpec, FeatureSpec, FeatureSpecBuilder};
