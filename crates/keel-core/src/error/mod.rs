//! Error types and result aliases for Keel operations.
//!
//! Provides a unified error type that covers every failure the type system,
//! the override containers, the package-selection algebra and the resolution
//! engine can report. Every variant names the offending spec, feature or
//! feature-pack coordinate so a failed build can be diagnosed from the message
//! alone.

use thiserror::Error;

/// Unified error type for all Keel operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeelError {
    // Description errors
    #[error("Invalid spec id '{input}': {reason}")]
    InvalidSpecId { input: String, reason: String },

    #[error("Invalid feature id for spec '{spec}': {reason}")]
    InvalidFeatureId { spec: String, reason: String },

    #[error("Invalid feature-pack coordinate '{input}': {reason}")]
    InvalidCoordinate { input: String, reason: String },

    #[error("Parameter '{param}' of feature spec '{spec}' is invalid: {reason}")]
    InvalidParameterSpec {
        spec: String,
        param: String,
        reason: String,
    },

    #[error("Reference '{reference}' of feature spec '{spec}' is invalid: {reason}")]
    InvalidReferenceSpec {
        spec: String,
        reference: String,
        reason: String,
    },

    #[error("Feature spec '{name}' is registered more than once")]
    DuplicateSpec { name: String },

    #[error("Feature spec '{spec}' failed validation of reference '{reference}': {reason}")]
    SpecValidation {
        spec: String,
        reference: String,
        reason: String,
    },

    #[error("Conflicting configuration for {subject}: {reason}")]
    ConfigConflict { subject: String, reason: String },

    #[error("Resolver setting '{field}' is invalid: {reason}")]
    Settings { field: String, reason: String },

    // Feature instantiation errors
    #[error("Feature '{feature}' of spec '{spec}' is missing required parameter '{param}'")]
    MissingRequiredParameter {
        spec: String,
        feature: String,
        param: String,
    },

    #[error("Feature spec '{spec}' does not declare parameter '{param}'")]
    UnknownParameter { spec: String, param: String },

    #[error("Feature '{id}' has already been added")]
    DuplicateFeature { id: String },

    #[error(
        "Conflicting identity for nested feature of spec '{spec}': parameter '{param}' is '{declared}' but the parent provides '{inherited}'"
    )]
    ConflictingIdentity {
        spec: String,
        param: String,
        inherited: String,
        declared: String,
    },

    #[error("Reference '{reference}' of spec '{spec}' cannot be resolved: parameter '{param}' has no value")]
    UnresolvableReference {
        spec: String,
        reference: String,
        param: String,
    },

    // Resolution errors
    #[error("Feature '{feature}' references '{target}' through '{reference}', which is not part of the configuration")]
    UnresolvedReference {
        feature: String,
        reference: String,
        target: String,
    },

    #[error("Feature '{feature}' depends on '{dependency}', which is not part of the configuration")]
    UnsatisfiedDependency { feature: String, dependency: String },

    #[error("Cyclic feature references detected: {cycle}")]
    CyclicReference { cycle: String },

    #[error("Circular feature group dependency detected: {cycle}")]
    CircularGroupDependency { cycle: String },

    #[error("Feature group '{group}' is nested deeper than the configured limit of {limit}")]
    GroupDepthExceeded { group: String, limit: usize },

    #[error("Feature-pack alias '{alias}' is not declared as a dependency")]
    UnknownFeaturePackAlias { alias: String },

    // Lookup errors
    #[error("Feature spec '{spec}' not found")]
    SpecNotFound { spec: String },

    #[error("Feature group '{group}' not found")]
    GroupNotFound { group: String },

    #[error("Feature '{id}' not found")]
    FeatureNotFound { id: String },
}

/// Result type alias for Keel operations
pub type KeelResult<T> = Result<T, KeelError>;

/// Broad classification of a [`KeelError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed input handed to a builder or constructor
    Description,
    /// Raised while resolving or lining up a configuration
    Resolution,
    /// Package-selection merge across mismatched feature packs
    Merge,
    /// A loader could not find what it was asked for
    Lookup,
}

impl KeelError {
    /// Create a config conflict error
    pub fn conflict(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigConflict {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Create a spec validation error
    pub fn spec_validation(
        spec: impl Into<String>,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SpecValidation {
            spec: spec.into(),
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            KeelError::InvalidSpecId { .. }
            | KeelError::InvalidFeatureId { .. }
            | KeelError::InvalidCoordinate { .. }
            | KeelError::InvalidParameterSpec { .. }
            | KeelError::InvalidReferenceSpec { .. }
            | KeelError::DuplicateSpec { .. }
            | KeelError::SpecValidation { .. }
            | KeelError::Settings { .. }
            | KeelError::MissingRequiredParameter { .. }
            | KeelError::UnknownParameter { .. }
            | KeelError::DuplicateFeature { .. }
            | KeelError::ConflictingIdentity { .. }
            | KeelError::UnresolvableReference { .. } => ErrorCategory::Description,
            KeelError::ConfigConflict { .. } => ErrorCategory::Merge,
            KeelError::UnresolvedReference { .. }
            | KeelError::UnsatisfiedDependency { .. }
            | KeelError::CyclicReference { .. }
            | KeelError::CircularGroupDependency { .. }
            | KeelError::GroupDepthExceeded { .. }
            | KeelError::UnknownFeaturePackAlias { .. } => ErrorCategory::Resolution,
            KeelError::SpecNotFound { .. }
            | KeelError::GroupNotFound { .. }
            | KeelError::FeatureNotFound { .. } => ErrorCategory::Lookup,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            KeelError::UnresolvedReference { .. } => {
                Some("Add the referenced feature to the configuration or stop excluding it")
            },
            KeelError::UnsatisfiedDependency { .. } => {
                Some("Add the feature this one depends on, or drop the explicit dependency")
            },
            KeelError::CyclicReference { .. } | KeelError::CircularGroupDependency { .. } => {
                Some("Break the cycle by making one of the references nillable or removing it")
            },
            KeelError::DuplicateFeature { .. } => {
                Some("Add the feature in overwrite mode to customize an existing definition")
            },
            KeelError::UnknownFeaturePackAlias { .. } => {
                Some("Declare the feature pack as a dependency with this alias")
            },
            KeelError::ConfigConflict { .. } => {
                Some("A spec or feature cannot be both included and excluded on the same edge")
            },
            _ => None,
        }
    }
}
