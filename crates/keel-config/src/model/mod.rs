//! Named top-level configurations and their anonymous layers.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::group::{FeatureGroupConfig, FeatureGroupSpec};
use keel_core::types::FeatureConfig;

/// Identifies a config: a model plus an optional name.
///
/// A config without a name is an anonymous layer of its model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConfigId {
    pub model: String,
    pub name: Option<String>,
}

impl ConfigId {
    /// Blank names are treated as absent
    pub fn new(model: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            model: model.into(),
            name: name.filter(|n| !n.trim().is_empty()).map(str::to_string),
        }
    }

    pub fn named(model: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(model, Some(name.as_str()))
    }

    pub fn anonymous(model: impl Into<String>) -> Self {
        Self::new(model, None)
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.model, name),
            None => write!(f, "{}", self.model),
        }
    }
}

/// One layer of a top-level config
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigModel {
    pub id: ConfigId,
    pub properties: IndexMap<String, String>,
    pub body: FeatureGroupSpec,
}

impl ConfigModel {
    pub fn builder(model: impl Into<String>) -> ConfigModelBuilder {
        let model = model.into();
        ConfigModelBuilder {
            body: FeatureGroupSpec::builder(model.clone()),
            id: ConfigId::anonymous(model),
            properties: IndexMap::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.id.model
    }

    pub fn name(&self) -> Option<&str> {
        self.id.name.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_anonymous()
    }
}

/// Fluent construction of a [`ConfigModel`]
#[derive(Debug, Clone)]
pub struct ConfigModelBuilder {
    id: ConfigId,
    properties: IndexMap<String, String>,
    body: crate::group::FeatureGroupSpecBuilder,
}

impl ConfigModelBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.id = ConfigId::new(self.id.model, Some(name.as_str()));
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn dependency(mut self, edge: FeatureGroupConfig) -> Self {
        self.body = self.body.dependency(edge);
        self
    }

    pub fn external_dependency(mut self, alias: impl Into<String>, edge: FeatureGroupConfig) -> Self {
        self.body = self.body.external_dependency(alias, edge);
        self
    }

    pub fn feature(mut self, feature: FeatureConfig) -> Self {
        self.body = self.body.feature(feature);
        self
    }

    pub fn external_feature(mut self, alias: impl Into<String>, feature: FeatureConfig) -> Self {
        self.body = self.body.external_feature(alias, feature);
        self
    }

    pub fn build(self) -> ConfigModel {
        ConfigModel {
            id: self.id,
            properties: self.properties,
            body: self.body.build(),
        }
    }
}
