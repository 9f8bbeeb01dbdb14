//! Configuration containers for Keel
//!
//! Feature groups and their override edges, config models, feature-pack
//! package selection and the settings of the resolution engine.

pub mod fp;
pub mod group;
pub mod model;
pub mod settings;

// Re-export main types
pub use fp::{FeaturePackConfig, FeaturePackConfigBuilder, FeaturePackDepsConfig};
pub use group::{FeatureGroupConfig, FeatureGroupConfigBuilder, FeatureGroupSpec, FeatureGroupSpecBuilder};
pub use model::{ConfigId, ConfigModel, ConfigModelBuilder};
pub use settings::ResolverSettings;

use keel_core::error::KeelError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, KeelError>;
