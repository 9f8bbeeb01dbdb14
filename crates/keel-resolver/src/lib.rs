//! Configuration resolution engine for Keel
//!
//! Walks config models and feature groups through the override stack,
//! merges repeated features, checks reference integrity and lines features
//! up in a deterministic dependency order.

pub mod builder;
pub mod graph;
pub mod loader;
pub mod overrides;
pub mod provisioning;
pub mod resolved;

// Re-export main types
pub use builder::{AddMode, MainConfigBuilder};
pub use graph::{FeatureEdge, FeatureGraph, FeatureNode};
pub use loader::{
    FeatureConfigLoader, FeatureGroupLoader, FeatureSpecLoader, MemoryFeatureLoader, MemoryGroupLoader,
    NoFeatureLoader, NoGroupLoader, PackSpecLoader,
};
pub use overrides::OverrideStack;
pub use provisioning::ConfigModelResolver;
pub use resolved::{ResolvedConfig, ResolvedFeature};

use keel_core::error::KeelError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, KeelError>;
