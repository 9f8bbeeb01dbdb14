//! # keel-core
//!
//! Core types shared across all Keel crates.
//!
//! This crate provides:
//! - `SpecId`, `FeatureId` and `FeaturePackCoord` identifiers
//! - The feature type system: parameter and reference specs, `FeatureSpec`
//!   and the validated `FeatureSpecRegistry`
//! - Identity derivation and reference resolution for `FeatureConfig`s
//! - `KeelError` enum for unified error handling
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Identifiers, specs, registry and feature configs
//! - `error`: Error types and result aliases

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorCategory, KeelError, KeelResult};
pub use types::{
    FeatureConfig, FeatureId, FeatureParameterSpec, FeaturePackCoord, FeatureReferenceSpec,
    FeatureSpec, FeatureSpecRegistry, SpecId,
};
