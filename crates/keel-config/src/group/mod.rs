//! Feature groups and the dependency edges that pull them in.
//!
//! A [`FeatureGroupConfig`] is an edge from a group or config to another
//! group (or directly to individual features) carrying include/exclude
//! instructions. A [`FeatureGroupSpec`] is the group's own content: further
//! edges, edges into other feature packs and feature configs.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use keel_core::error::KeelError;
use keel_core::types::{FeatureConfig, FeatureId, SpecId};

use crate::ConfigResult;

/// Dependency edge with include/exclude overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureGroupConfig {
    origin: Option<String>,
    name: Option<String>,
    inherit_features: bool,
    included_specs: IndexSet<SpecId>,
    excluded_specs: IndexSet<SpecId>,
    included_features: IndexMap<FeatureId, Option<FeatureConfig>>,
    excluded_features: IndexMap<FeatureId, Option<String>>,
}

impl FeatureGroupConfig {
    /// Plain edge to the group `name`, inheriting all of its features
    pub fn new(name: impl Into<String>) -> Self {
        Self::group(name).build()
    }

    /// Edge to the group `name`
    pub fn group(name: impl Into<String>) -> FeatureGroupConfigBuilder {
        FeatureGroupConfigBuilder::new(None, Some(name.into()))
    }

    /// Edge to the group `name` of the feature pack aliased `origin`
    pub fn external(origin: impl Into<String>, name: impl Into<String>) -> FeatureGroupConfigBuilder {
        FeatureGroupConfigBuilder::new(Some(origin.into()), Some(name.into()))
    }

    /// Edge that targets individual features instead of a named group
    pub fn features() -> FeatureGroupConfigBuilder {
        FeatureGroupConfigBuilder::new(None, None)
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Target group name; `None` for a feature-only edge
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_feature_only(&self) -> bool {
        self.name.is_none()
    }

    pub fn inherit_features(&self) -> bool {
        self.inherit_features
    }

    pub fn included_specs(&self) -> &IndexSet<SpecId> {
        &self.included_specs
    }

    pub fn excluded_specs(&self) -> &IndexSet<SpecId> {
        &self.excluded_specs
    }

    pub fn included_features(&self) -> &IndexMap<FeatureId, Option<FeatureConfig>> {
        &self.included_features
    }

    pub fn excluded_features(&self) -> &IndexMap<FeatureId, Option<String>> {
        &self.excluded_features
    }

    /// Whether the edge carries any include/exclude instruction
    pub fn has_overrides(&self) -> bool {
        !self.inherit_features
            || !self.included_specs.is_empty()
            || !self.excluded_specs.is_empty()
            || !self.included_features.is_empty()
            || !self.excluded_features.is_empty()
    }

    pub fn is_spec_excluded(&self, spec: &SpecId) -> bool {
        self.excluded_specs.contains(spec)
    }

    pub fn is_spec_included(&self, spec: &SpecId) -> bool {
        self.included_specs.contains(spec)
    }

    pub fn is_feature_included(&self, id: &FeatureId) -> bool {
        self.included_features.contains_key(id)
    }

    /// Explicitly excluded, or its spec is excluded and the feature itself
    /// is not explicitly included
    pub fn is_feature_excluded(&self, id: &FeatureId) -> bool {
        self.excluded_features.contains_key(id) || self.spec_excludes(id)
    }

    /// Exclusion as applied while walking a group: an exclusion annotated with
    /// a parent-ref only matches features nested through that parent-ref.
    pub fn excludes_feature(&self, id: &FeatureId, parent_ref: Option<&str>) -> bool {
        match self.excluded_features.get(id) {
            Some(None) => true,
            Some(Some(annotated)) if parent_ref == Some(annotated.as_str()) => true,
            _ => self.spec_excludes(id),
        }
    }

    fn spec_excludes(&self, id: &FeatureId) -> bool {
        self.excluded_specs.contains(id.spec()) && !self.included_features.contains_key(id)
    }

    /// Whether this edge drops every feature of `spec`, whatever its identity
    pub fn excludes_spec(&self, spec: &SpecId) -> bool {
        let dropped = self.excluded_specs.contains(spec)
            || !(self.inherit_features || self.included_specs.contains(spec));
        dropped && !self.included_features.keys().any(|id| id.spec() == spec)
    }

    /// Whether a feature reached through this edge is pulled in at all.
    ///
    /// Inheriting edges admit everything that is not excluded; other edges
    /// admit only explicitly included specs and features.
    pub fn admits(&self, spec: &SpecId, id: Option<&FeatureId>) -> bool {
        self.inherit_features
            || self.included_specs.contains(spec)
            || id.is_some_and(|id| self.included_features.contains_key(id))
    }

    /// Copy of this edge with every spec and feature id qualified by the
    /// origin the edge is evaluated in
    pub fn qualified(&self, scope: Option<&str>) -> Self {
        let origin = self.origin.as_deref().or(scope);
        Self {
            origin: origin.map(str::to_string),
            name: self.name.clone(),
            inherit_features: self.inherit_features,
            included_specs: self.included_specs.iter().map(|s| s.qualify(origin)).collect(),
            excluded_specs: self.excluded_specs.iter().map(|s| s.qualify(origin)).collect(),
            included_features: self
                .included_features
                .iter()
                .map(|(id, body)| {
                    let body = body.clone().map(|mut config| {
                        config.spec = config.spec.qualify(origin);
                        config
                    });
                    (id.qualify(origin), body)
                })
                .collect(),
            excluded_features: self
                .excluded_features
                .iter()
                .map(|(id, parent_ref)| (id.qualify(origin), parent_ref.clone()))
                .collect(),
        }
    }

    /// Human-readable label for logs and errors
    pub fn label(&self) -> String {
        match (&self.origin, &self.name) {
            (Some(origin), Some(name)) => format!("{}#{}", origin, name),
            (None, Some(name)) => name.clone(),
            (Some(origin), None) => format!("{}#<features>", origin),
            (None, None) => "<features>".to_string(),
        }
    }
}

/// Builder for [`FeatureGroupConfig`] that rejects contradictory instructions
#[derive(Debug, Clone)]
pub struct FeatureGroupConfigBuilder {
    config: FeatureGroupConfig,
}

impl FeatureGroupConfigBuilder {
    fn new(origin: Option<String>, name: Option<String>) -> Self {
        Self {
            config: FeatureGroupConfig {
                origin,
                name,
                inherit_features: true,
                included_specs: IndexSet::new(),
                excluded_specs: IndexSet::new(),
                included_features: IndexMap::new(),
                excluded_features: IndexMap::new(),
            },
        }
    }

    /// Resolve the target through a feature-pack alias
    pub fn origin(mut self, alias: impl Into<String>) -> Self {
        self.config.origin = Some(alias.into());
        self
    }

    pub fn inherit_features(mut self, inherit: bool) -> Self {
        self.config.inherit_features = inherit;
        self
    }

    pub fn include_spec(mut self, spec: impl Into<SpecId>) -> ConfigResult<Self> {
        let spec = spec.into();
        spec.validate()?;
        if self.config.excluded_specs.contains(&spec) {
            return Err(self.conflict(&spec, "spec is already excluded"));
        }
        self.config.included_specs.insert(spec);
        Ok(self)
    }

    pub fn exclude_spec(mut self, spec: impl Into<SpecId>) -> ConfigResult<Self> {
        let spec = spec.into();
        spec.validate()?;
        if self.config.included_specs.contains(&spec) {
            return Err(self.conflict(&spec, "spec is already included"));
        }
        self.config.excluded_specs.insert(spec);
        Ok(self)
    }

    /// Include a feature, optionally customizing it with `body`.
    ///
    /// The body inherits the id's parameter values; a body that sets an ID
    /// parameter to a different value is rejected.
    pub fn include_feature(mut self, id: FeatureId, body: Option<FeatureConfig>) -> ConfigResult<Self> {
        id.spec().validate()?;
        if self.config.excluded_features.contains_key(&id) {
            return Err(self.conflict(&id, "feature is already excluded"));
        }

        let body = match body {
            Some(body) => {
                if body.spec != *id.spec() {
                    return Err(self.conflict(
                        &id,
                        format!("override body is for spec '{}'", body.spec),
                    ));
                }
                for (name, value) in id.params() {
                    if let Some(other) = body.get(name) {
                        if other != value {
                            return Err(self.conflict(
                                &id,
                                format!("override body sets '{}' to '{}'", name, other),
                            ));
                        }
                    }
                }
                let mut config = FeatureConfig::from_id(&id);
                config.merge(body);
                Some(config)
            },
            None => None,
        };

        self.config.included_features.insert(id, body);
        Ok(self)
    }

    pub fn exclude_feature(self, id: FeatureId) -> ConfigResult<Self> {
        self.exclude(id, None)
    }

    /// Exclude a feature only where it is nested through `parent_ref`
    pub fn exclude_nested_feature(self, id: FeatureId, parent_ref: impl Into<String>) -> ConfigResult<Self> {
        self.exclude(id, Some(parent_ref.into()))
    }

    fn exclude(mut self, id: FeatureId, parent_ref: Option<String>) -> ConfigResult<Self> {
        id.spec().validate()?;
        if self.config.included_features.contains_key(&id) {
            return Err(self.conflict(&id, "feature is already included"));
        }
        self.config.excluded_features.insert(id, parent_ref);
        Ok(self)
    }

    fn conflict(&self, subject: &dyn std::fmt::Display, reason: impl Into<String>) -> KeelError {
        KeelError::conflict(format!("{} in '{}'", subject, self.config.label()), reason)
    }

    pub fn build(self) -> FeatureGroupConfig {
        self.config
    }
}

/// Content of a feature group (or the body of a config model)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureGroupSpec {
    pub name: String,
    /// Edges to other groups, processed first and in order
    pub dependencies: Vec<FeatureGroupConfig>,
    /// Content that lives in other feature packs, keyed by alias
    pub external: IndexMap<String, FeatureGroupSpec>,
    /// Features declared by the group itself
    pub features: Vec<FeatureConfig>,
}

impl FeatureGroupSpec {
    /// Empty group named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn builder(name: impl Into<String>) -> FeatureGroupSpecBuilder {
        FeatureGroupSpecBuilder {
            spec: Self::new(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.external.is_empty() && self.features.is_empty()
    }
}

/// Fluent construction of a [`FeatureGroupSpec`]
#[derive(Debug, Clone)]
pub struct FeatureGroupSpecBuilder {
    spec: FeatureGroupSpec,
}

impl FeatureGroupSpecBuilder {
    pub fn dependency(mut self, edge: FeatureGroupConfig) -> Self {
        self.spec.dependencies.push(edge);
        self
    }

    pub fn feature(mut self, feature: FeatureConfig) -> Self {
        self.spec.features.push(feature);
        self
    }

    /// Edge evaluated in the scope of the feature pack aliased `alias`
    pub fn external_dependency(mut self, alias: impl Into<String>, edge: FeatureGroupConfig) -> Self {
        self.external_block(alias.into()).dependencies.push(edge);
        self
    }

    /// Feature whose spec lives in the feature pack aliased `alias`
    pub fn external_feature(mut self, alias: impl Into<String>, feature: FeatureConfig) -> Self {
        self.external_block(alias.into()).features.push(feature);
        self
    }

    fn external_block(&mut self, alias: String) -> &mut FeatureGroupSpec {
        self.spec
            .external
            .entry(alias.clone())
            .or_insert_with(|| FeatureGroupSpec::new(alias))
    }

    pub fn build(self) -> FeatureGroupSpec {
        self.spec
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Spec-level exclusion never beats a feature-level inclusion
        #[test]
        fn feature_inclusion_beats_spec_exclusion(
            included in "[a-z]{1,6}",
            others in prop::collection::vec("[a-z]{1,6}", 1..6)
        ) {
            let kept = FeatureId::single("host", "name", included.clone());
            let edge = FeatureGroupConfig::group("g")
                .exclude_spec("host")
                .unwrap()
                .include_feature(kept.clone(), None)
                .unwrap()
                .build();

            prop_assert!(!edge.is_feature_excluded(&kept));
            for other in others.into_iter().filter(|o| *o != included) {
                prop_assert!(edge.is_feature_excluded(&FeatureId::single("host", "name", other)));
            }
        }
    }
}
