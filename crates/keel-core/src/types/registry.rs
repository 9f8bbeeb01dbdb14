//! Per-feature-pack registry of feature specs.
//!
//! The registry is built once and checked for referential integrity: every
//! reference must point at a spec that exists, has an identity and whose ID
//! parameters match the reference mapping.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{FeatureReferenceSpec, FeatureSpec};
use crate::error::{KeelError, KeelResult};

/// Validated set of feature specs keyed by name
#[derive(Debug, Clone, Default)]
pub struct FeatureSpecRegistry {
    specs: IndexMap<String, Arc<FeatureSpec>>,
}

/// Collects specs before validation
#[derive(Debug, Default)]
pub struct FeatureSpecRegistryBuilder {
    specs: IndexMap<String, Arc<FeatureSpec>>,
}

impl FeatureSpecRegistry {
    pub fn builder() -> FeatureSpecRegistryBuilder {
        FeatureSpecRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FeatureSpec>> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs in registration order
    pub fn specs(&self) -> impl Iterator<Item = &Arc<FeatureSpec>> {
        self.specs.values()
    }
}

impl FeatureSpecRegistryBuilder {
    /// Register a spec; names must be unique
    pub fn add(mut self, spec: FeatureSpec) -> KeelResult<Self> {
        if self.specs.contains_key(spec.name()) {
            return Err(KeelError::DuplicateSpec {
                name: spec.name().to_string(),
            });
        }
        self.specs.insert(spec.name().to_string(), Arc::new(spec));
        Ok(self)
    }

    /// Validate references and freeze the registry.
    ///
    /// Packs without any reference skip validation entirely. References to
    /// origin-qualified specs live in other feature packs and are left to the
    /// resolver.
    pub fn build(self) -> KeelResult<FeatureSpecRegistry> {
        if self.specs.values().any(|spec| spec.has_references()) {
            for spec in self.specs.values() {
                for reference in spec.references() {
                    if reference.target.origin().is_some() {
                        continue;
                    }
                    let target = self.specs.get(reference.target.name()).map(Arc::as_ref);
                    validate_reference(spec, reference, target)?;
                }
            }
        }
        Ok(FeatureSpecRegistry { specs: self.specs })
    }
}

/// Check one reference of `spec` against its target spec.
///
/// `target` is `None` when the target spec could not be found.
pub fn validate_reference(
    spec: &FeatureSpec,
    reference: &FeatureReferenceSpec,
    target: Option<&FeatureSpec>,
) -> KeelResult<()> {
    let fail = |reason: String| Err(KeelError::spec_validation(spec.name(), &reference.name, reason));

    let Some(target) = target else {
        return fail(format!("target spec '{}' does not exist", reference.target));
    };
    if !target.has_id() {
        return fail(format!("target spec '{}' has no ID parameters", reference.target));
    }
    if reference.mapping.len() != target.id_params().len() {
        return fail(format!(
            "mapping has {} parameter(s) but '{}' has {} ID parameter(s)",
            reference.mapping.len(),
            reference.target,
            target.id_params().len()
        ));
    }
    for (local, target_param) in &reference.mapping {
        if !spec.has_param(local) {
            return fail(format!("local parameter '{}' is not declared", local));
        }
        if !target.has_param(target_param) {
            return fail(format!(
                "parameter '{}' is not declared by '{}'",
                target_param, reference.target
            ));
        }
    }
    Ok(())
}
