//! Feature spec types: parameters, references and identity derivation.
//!
//! A [`FeatureSpec`] is the static type of a feature. Its ID parameters form
//! the identity of every feature instantiating it, and its references are
//! typed foreign keys to features of other specs.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::{FeatureConfig, FeatureId, SpecId};
use crate::error::{KeelError, KeelResult};

/// Parameter declared by a feature spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureParameterSpec {
    pub name: String,
    /// Whether the parameter is part of the feature identity
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl FeatureParameterSpec {
    /// Create a required, non-identity parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: false,
            nillable: false,
            default: None,
        }
    }

    /// Create an ID parameter
    pub fn id(name: impl Into<String>) -> Self {
        Self {
            id: true,
            ..Self::new(name)
        }
    }

    /// Allow the parameter to be left unset
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Set the value used when a config leaves the parameter unset
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether a config must provide a value for this parameter
    pub fn is_required(&self) -> bool {
        !self.nillable && self.default.is_none()
    }
}

/// Typed reference from one feature spec to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureReferenceSpec {
    pub name: String,
    /// Spec of the referenced feature; an unqualified target belongs to the
    /// same feature pack as the referring spec
    pub target: SpecId,
    #[serde(default)]
    pub nillable: bool,
    /// `(local parameter, target ID parameter)` pairs
    pub mapping: Vec<(String, String)>,
}

impl FeatureReferenceSpec {
    /// Create a reference named `name` to `target`
    pub fn new(name: impl Into<String>, target: impl Into<SpecId>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            nillable: false,
            mapping: Vec::new(),
        }
    }

    /// Create a reference named after its target spec
    pub fn to(target: impl Into<SpecId>) -> Self {
        let target = target.into();
        Self::new(target.name().to_string(), target)
    }

    /// Map a local parameter onto an ID parameter of the target
    pub fn map(mut self, local: impl Into<String>, target: impl Into<String>) -> Self {
        self.mapping.push((local.into(), target.into()));
        self
    }

    /// Let the reference resolve to nothing when its source values are unset
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }
}

/// Static type definition of a feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSpec {
    name: String,
    params: IndexMap<String, FeatureParameterSpec>,
    id_params: Vec<String>,
    references: IndexMap<String, FeatureReferenceSpec>,
    local_package_deps: IndexSet<String>,
    external_package_deps: IndexMap<String, IndexSet<String>>,
}

impl FeatureSpec {
    /// Start building a spec named `name`
    pub fn builder(name: impl Into<String>) -> FeatureSpecBuilder {
        FeatureSpecBuilder {
            name: name.into(),
            params: Vec::new(),
            references: Vec::new(),
            local_package_deps: IndexSet::new(),
            external_package_deps: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> impl Iterator<Item = &FeatureParameterSpec> {
        self.params.values()
    }

    pub fn param(&self, name: &str) -> Option<&FeatureParameterSpec> {
        self.params.get(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// ID parameter names in declaration order
    pub fn id_params(&self) -> &[String] {
        &self.id_params
    }

    /// Whether features of this spec have an identity
    pub fn has_id(&self) -> bool {
        !self.id_params.is_empty()
    }

    pub fn references(&self) -> impl Iterator<Item = &FeatureReferenceSpec> {
        self.references.values()
    }

    pub fn reference(&self, name: &str) -> Option<&FeatureReferenceSpec> {
        self.references.get(name)
    }

    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }

    /// Packages of the owning feature pack this spec needs (opaque to the resolver)
    pub fn local_package_deps(&self) -> &IndexSet<String> {
        &self.local_package_deps
    }

    /// Packages of other feature packs this spec needs, by feature-pack alias
    pub fn external_package_deps(&self) -> &IndexMap<String, IndexSet<String>> {
        &self.external_package_deps
    }

    /// Value of a parameter in `config`, falling back to its default
    pub fn param_value<'a>(&'a self, name: &str, config: &'a FeatureConfig) -> Option<&'a str> {
        config
            .get(name)
            .or_else(|| self.params.get(name).and_then(|p| p.default.as_deref()))
    }

    /// Reject parameters the spec does not declare
    pub fn check_known_params(&self, config: &FeatureConfig) -> KeelResult<()> {
        match config.params.keys().find(|name| !self.params.contains_key(*name)) {
            Some(unknown) => Err(KeelError::UnknownParameter {
                spec: config.spec.to_string(),
                param: unknown.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Require a value (explicit or default) for every non-nillable parameter
    pub fn check_required_params(&self, config: &FeatureConfig) -> KeelResult<()> {
        for param in self.params.values() {
            if param.is_required() && config.get(&param.name).is_none() {
                return Err(KeelError::MissingRequiredParameter {
                    spec: config.spec.to_string(),
                    feature: config.describe(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Derive the identity of `config`, or `None` when the spec declares no
    /// ID parameters.
    ///
    /// `spec_id` is the fully qualified id under which the spec was loaded.
    pub fn derive_feature_id(
        &self,
        spec_id: &SpecId,
        config: &FeatureConfig,
    ) -> KeelResult<Option<FeatureId>> {
        if self.id_params.is_empty() {
            return Ok(None);
        }

        let mut params = IndexMap::with_capacity(self.id_params.len());
        for name in &self.id_params {
            let value = self.param_value(name, config).ok_or_else(|| {
                KeelError::MissingRequiredParameter {
                    spec: spec_id.to_string(),
                    feature: config.describe(),
                    param: name.clone(),
                }
            })?;
            params.insert(name.clone(), value.to_string());
        }

        FeatureId::new(spec_id.clone(), params).map(Some)
    }

    /// Resolve the feature `config` points at through `reference`.
    ///
    /// Returns `None` for a nillable reference whose source values are unset.
    pub fn resolve_reference_target(
        &self,
        spec_id: &SpecId,
        reference: &FeatureReferenceSpec,
        config: &FeatureConfig,
    ) -> KeelResult<Option<FeatureId>> {
        let target = reference.target.qualify(spec_id.origin());

        let mut params = IndexMap::with_capacity(reference.mapping.len());
        for (local, target_param) in &reference.mapping {
            match self.param_value(local, config) {
                Some(value) => {
                    params.insert(target_param.clone(), value.to_string());
                },
                None if reference.nillable => return Ok(None),
                None => {
                    return Err(KeelError::UnresolvableReference {
                        spec: spec_id.to_string(),
                        reference: reference.name.clone(),
                        param: local.clone(),
                    })
                },
            }
        }

        FeatureId::new(target, params).map(Some)
    }

    /// `(child parameter, parent parameter)` pairs through which a nested
    /// feature of this spec inherits values from its parent.
    ///
    /// Uses the reference named `parent_ref` when declared, otherwise the
    /// parent's ID parameters that this spec declares under the same name.
    pub fn parent_mapping(&self, parent_ref: &str, parent: &FeatureSpec) -> Vec<(String, String)> {
        match self.references.get(parent_ref) {
            Some(reference) => reference.mapping.clone(),
            None => parent
                .id_params
                .iter()
                .filter(|name| self.params.contains_key(*name))
                .map(|name| (name.clone(), name.clone()))
                .collect(),
        }
    }
}

/// Fluent construction of a [`FeatureSpec`]
#[derive(Debug, Clone)]
pub struct FeatureSpecBuilder {
    name: String,
    params: Vec<FeatureParameterSpec>,
    references: Vec<FeatureReferenceSpec>,
    local_package_deps: IndexSet<String>,
    external_package_deps: IndexMap<String, IndexSet<String>>,
}

impl FeatureSpecBuilder {
    pub fn param(mut self, param: FeatureParameterSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn reference(mut self, reference: FeatureReferenceSpec) -> Self {
        self.references.push(reference);
        self
    }

    pub fn package_dep(mut self, package: impl Into<String>) -> Self {
        self.local_package_deps.insert(package.into());
        self
    }

    pub fn external_package_dep(
        mut self,
        origin: impl Into<String>,
        package: impl Into<String>,
    ) -> Self {
        self.external_package_deps
            .entry(origin.into())
            .or_default()
            .insert(package.into());
        self
    }

    /// Validate the declarations and build the spec
    pub fn build(self) -> KeelResult<FeatureSpec> {
        let mut params = IndexMap::with_capacity(self.params.len());
        let mut id_params = Vec::new();

        for param in self.params {
            if param.id && param.nillable {
                return Err(KeelError::InvalidParameterSpec {
                    spec: self.name,
                    param: param.name,
                    reason: "an ID parameter cannot be nillable".to_string(),
                });
            }
            if params.contains_key(&param.name) {
                return Err(KeelError::InvalidParameterSpec {
                    spec: self.name,
                    param: param.name,
                    reason: "declared more than once".to_string(),
                });
            }
            if param.id {
                id_params.push(param.name.clone());
            }
            params.insert(param.name.clone(), param);
        }

        let mut references = IndexMap::with_capacity(self.references.len());
        for reference in self.references {
            if reference.mapping.is_empty() {
                return Err(KeelError::InvalidReferenceSpec {
                    spec: self.name,
                    reference: reference.name,
                    reason: "parameter mapping is empty".to_string(),
                });
            }
            if references.contains_key(&reference.name) {
                return Err(KeelError::InvalidReferenceSpec {
                    spec: self.name,
                    reference: reference.name,
                    reason: "declared more than once".to_string(),
                });
            }
            references.insert(reference.name.clone(), reference);
        }

        Ok(FeatureSpec {
            name: self.name,
            params,
            id_params,
            references,
            local_package_deps: self.local_package_deps,
            external_package_deps: self.external_package_deps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_spec() -> FeatureSpec {
        FeatureSpec::builder("host")
            .param(FeatureParameterSpec::id("name"))
            .param(FeatureParameterSpec::new("os").nillable())
            .build()
            .unwrap()
    }

    fn binding_spec() -> FeatureSpec {
        FeatureSpec::builder("binding")
            .param(FeatureParameterSpec::id("host"))
            .param(FeatureParameterSpec::id("port"))
            .reference(FeatureReferenceSpec::to("host").map("host", "name"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_spec_declares_id_params_in_order() {
        let spec = binding_spec();
        assert_eq!(spec.id_params(), &["host".to_string(), "port".to_string()]);
        assert!(spec.has_id());
        assert!(spec.has_references());
        assert_eq!(spec.reference("host").unwrap().target, SpecId::new("host"));
    }

    #[test]
    fn test_id_param_cannot_be_nillable() {
        let err = FeatureSpec::builder("bad")
            .param(FeatureParameterSpec::id("name").nillable())
            .build()
            .unwrap_err();
        assert!(matches!(err, KeelError::InvalidParameterSpec { .. }));
    }

    #[test]
    fn test_reference_mapping_must_not_be_empty() {
        let err = FeatureSpec::builder("bad")
            .param(FeatureParameterSpec::new("host"))
            .reference(FeatureReferenceSpec::to("host"))
            .build()
            .unwrap_err();
        assert!(matches!(err, KeelError::InvalidReferenceSpec { .. }));
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let err = FeatureSpec::builder("bad")
            .param(FeatureParameterSpec::new("a"))
            .param(FeatureParameterSpec::new("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, KeelError::InvalidParameterSpec { .. }));
    }

    #[test]
    fn test_derive_feature_id() {
        let spec = binding_spec();
        let config = FeatureConfig::new("binding")
            .param("port", "8080")
            .param("host", "h1");

        let id = spec
            .derive_feature_id(&SpecId::new("binding"), &config)
            .unwrap()
            .unwrap();
        // Declaration order, not config order
        assert_eq!(id.to_string(), "binding:host=h1,port=8080");
    }

    #[test]
    fn test_derive_feature_id_uses_default() {
        let spec = FeatureSpec::builder("pool")
            .param(FeatureParameterSpec::id("name").with_default("default"))
            .build()
            .unwrap();
        let id = spec
            .derive_feature_id(&SpecId::new("pool"), &FeatureConfig::new("pool"))
            .unwrap()
            .unwrap();
        assert_eq!(id.param("name"), Some("default"));
    }

    #[test]
    fn test_derive_feature_id_missing_value() {
        let err = host_spec()
            .derive_feature_id(&SpecId::new("host"), &FeatureConfig::new("host"))
            .unwrap_err();
        assert!(matches!(
            err,
            KeelError::MissingRequiredParameter { ref param, .. } if param == "name"
        ));
    }

    #[test]
    fn test_spec_without_id_has_no_identity() {
        let spec = FeatureSpec::builder("log")
            .param(FeatureParameterSpec::new("message"))
            .build()
            .unwrap();
        let config = FeatureConfig::new("log").param("message", "hi");
        assert_eq!(spec.derive_feature_id(&SpecId::new("log"), &config).unwrap(), None);
    }

    #[test]
    fn test_unknown_and_required_params() {
        let spec = host_spec();
        let unknown = FeatureConfig::new("host").param("name", "h1").param("cpu", "4");
        assert!(matches!(
            spec.check_known_params(&unknown),
            Err(KeelError::UnknownParameter { ref param, .. }) if param == "cpu"
        ));

        // os is nillable, so only name is required
        let minimal = FeatureConfig::new("host").param("name", "h1");
        assert!(spec.check_required_params(&minimal).is_ok());
    }

    #[test]
    fn test_resolve_reference_target() {
        let spec = binding_spec();
        let reference = spec.reference("host").unwrap();
        let config = FeatureConfig::new("binding")
            .param("host", "h1")
            .param("port", "8080");

        let target = spec
            .resolve_reference_target(&SpecId::new("binding"), reference, &config)
            .unwrap();
        assert_eq!(target, Some(FeatureId::single("host", "name", "h1")));
    }

    #[test]
    fn test_resolve_reference_inherits_origin() {
        let spec = binding_spec();
        let reference = spec.reference("host").unwrap();
        let config = FeatureConfig::new("core#binding").param("host", "h1");

        let target = spec
            .resolve_reference_target(&SpecId::with_origin("core", "binding"), reference, &config)
            .unwrap()
            .unwrap();
        assert_eq!(target.spec(), &SpecId::with_origin("core", "host"));
    }

    #[test]
    fn test_resolve_nillable_reference() {
        let spec = FeatureSpec::builder("binding")
            .param(FeatureParameterSpec::id("port"))
            .param(FeatureParameterSpec::new("host").nillable())
            .reference(FeatureReferenceSpec::to("host").map("host", "name").nillable())
            .build()
            .unwrap();
        let reference = spec.reference("host").unwrap();
        let config = FeatureConfig::new("binding").param("port", "80");

        assert_eq!(
            spec.resolve_reference_target(&SpecId::new("binding"), reference, &config)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_unresolvable_reference() {
        let spec = FeatureSpec::builder("binding")
            .param(FeatureParameterSpec::id("port"))
            .param(FeatureParameterSpec::new("host").nillable())
            .reference(FeatureReferenceSpec::to("host").map("host", "name"))
            .build()
            .unwrap();
        let reference = spec.reference("host").unwrap();
        let config = FeatureConfig::new("binding").param("port", "80");

        let err = spec
            .resolve_reference_target(&SpecId::new("binding"), reference, &config)
            .unwrap_err();
        assert!(matches!(err, KeelError::UnresolvableReference { .. }));
    }

    #[test]
    fn test_parent_mapping() {
        let parent = FeatureSpec::builder("parent")
            .param(FeatureParameterSpec::id("parentId"))
            .build()
            .unwrap();
        let implicit = FeatureSpec::builder("child")
            .param(FeatureParameterSpec::id("parentId"))
            .param(FeatureParameterSpec::id("extra"))
            .build()
            .unwrap();
        assert_eq!(
            implicit.parent_mapping("parent", &parent),
            vec![("parentId".to_string(), "parentId".to_string())]
        );

        let explicit = FeatureSpec::builder("child")
            .param(FeatureParameterSpec::id("owner"))
            .reference(FeatureReferenceSpec::new("owned-by", "parent").map("owner", "parentId"))
            .build()
            .unwrap();
        assert_eq!(
            explicit.parent_mapping("owned-by", &parent),
            vec![("owner".to_string(), "parentId".to_string())]
        );
    }
}
