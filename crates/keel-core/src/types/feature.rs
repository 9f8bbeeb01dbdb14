//! Concrete feature configurations.
//!
//! A [`FeatureConfig`] instantiates a feature spec with parameter values and
//! may carry nested child features. Configs are authored by consumers or
//! produced by a loader and are consumed by the resolution engine.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::{FeatureId, SpecId};

/// Parameter assignment for one feature, possibly with nested children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Spec this feature instantiates
    pub spec: SpecId,

    /// Parameter values by name
    #[serde(default)]
    pub params: IndexMap<String, String>,

    /// Child features, added after this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<FeatureConfig>,

    /// Name of the reference through which a nested feature points at its
    /// parent; defaults to the parent's spec name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<String>,

    /// Features that must be lined up before this one
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub dependencies: IndexSet<FeatureId>,
}

impl FeatureConfig {
    /// Create an empty config for `spec`
    pub fn new(spec: impl Into<SpecId>) -> Self {
        Self {
            spec: spec.into(),
            params: IndexMap::new(),
            nested: Vec::new(),
            parent_ref: None,
            dependencies: IndexSet::new(),
        }
    }

    /// Create a config whose parameters are the values of `id`
    pub fn from_id(id: &FeatureId) -> Self {
        let mut config = Self::new(id.spec().clone());
        config.params = id.params().clone();
        config
    }

    /// Set a parameter value
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a nested child feature
    pub fn nested(mut self, child: FeatureConfig) -> Self {
        self.nested.push(child);
        self
    }

    /// Name the reference a nested feature uses to point at its parent
    pub fn parent_ref(mut self, name: impl Into<String>) -> Self {
        self.parent_ref = Some(name.into());
        self
    }

    /// Declare an explicit dependency on another feature
    pub fn depends_on(mut self, id: FeatureId) -> Self {
        self.dependencies.insert(id);
        self
    }

    /// Value of a parameter
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Short description used in error messages: `spec:k=v,...`
    pub fn describe(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{}:{}", self.spec, params.join(","))
    }

    /// Apply `other` on top of this config: parameters are overridden, nested
    /// features and dependencies are appended.
    pub fn merge(&mut self, other: FeatureConfig) {
        self.params.extend(other.params);
        self.nested.extend(other.nested);
        self.dependencies.extend(other.dependencies);
        if other.parent_ref.is_some() {
            self.parent_ref = other.parent_ref;
        }
    }
}
