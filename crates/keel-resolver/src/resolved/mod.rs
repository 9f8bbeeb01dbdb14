//! Output of a configuration build.

use indexmap::IndexMap;
use serde::Serialize;

use keel_config::ConfigId;
use keel_core::types::{FeatureConfig, FeatureId, SpecId};

/// One feature of a resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFeature {
    /// Identity, `None` for specs without ID parameters
    pub id: Option<FeatureId>,
    /// Fully qualified spec
    pub spec: SpecId,
    /// Merged parameter values; nested features are resolved separately
    pub config: FeatureConfig,
    /// Identity of the feature this one was nested in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<FeatureId>,
}

impl ResolvedFeature {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.config.get(name)
    }

    /// `id` when present, otherwise the config's own description
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => self.config.describe(),
        }
    }
}

/// Fully resolved configuration: features in line-up order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub id: Option<ConfigId>,
    pub properties: IndexMap<String, String>,
    pub features: Vec<ResolvedFeature>,
}

impl ResolvedConfig {
    pub fn feature(&self, id: &FeatureId) -> Option<&ResolvedFeature> {
        self.features.iter().find(|f| f.id.as_ref() == Some(id))
    }

    /// Line-up position of the feature
    pub fn position(&self, id: &FeatureId) -> Option<usize> {
        self.features.iter().position(|f| f.id.as_ref() == Some(id))
    }

    /// Features of one spec, in line-up order
    pub fn features_of<'a>(&'a self, spec: &SpecId) -> impl Iterator<Item = &'a ResolvedFeature> + 'a {
        let spec = spec.clone();
        self.features.iter().filter(move |f| f.spec == spec)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFeature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
