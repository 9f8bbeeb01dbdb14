//! Loader capabilities through which the builder obtains specs, groups and
//! stored feature configs.
//!
//! Storage formats are out of scope: every loader is an injected trait
//! object. In-memory implementations cover tests and embedding, and plain
//! closures implement the traits too.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use keel_config::FeatureGroupSpec;
use keel_core::error::{KeelError, KeelResult};
use keel_core::types::{FeatureConfig, FeatureId, FeatureSpec, FeatureSpecRegistry, SpecId};

/// Resolves a [`SpecId`] to its feature spec
pub trait FeatureSpecLoader {
    /// Fails with [`KeelError::SpecNotFound`] for unknown specs
    fn load(&self, id: &SpecId) -> KeelResult<Arc<FeatureSpec>>;
}

/// Loads feature groups, optionally from the feature pack aliased `origin`
pub trait FeatureGroupLoader {
    /// Fails with [`KeelError::GroupNotFound`] for unknown groups
    fn load(&self, origin: Option<&str>, name: &str) -> KeelResult<Arc<FeatureGroupSpec>>;
}

/// Loads stand-alone feature configs by identity
pub trait FeatureConfigLoader {
    /// Fails with [`KeelError::FeatureNotFound`] for unknown features
    fn load(&self, id: &FeatureId) -> KeelResult<FeatureConfig>;
}

impl<F> FeatureSpecLoader for F
where
    F: Fn(&SpecId) -> KeelResult<Arc<FeatureSpec>>,
{
    fn load(&self, id: &SpecId) -> KeelResult<Arc<FeatureSpec>> {
        self(id)
    }
}

impl<F> FeatureGroupLoader for F
where
    F: Fn(Option<&str>, &str) -> KeelResult<Arc<FeatureGroupSpec>>,
{
    fn load(&self, origin: Option<&str>, name: &str) -> KeelResult<Arc<FeatureGroupSpec>> {
        self(origin, name)
    }
}

impl<F> FeatureConfigLoader for F
where
    F: Fn(&FeatureId) -> KeelResult<FeatureConfig>,
{
    fn load(&self, id: &FeatureId) -> KeelResult<FeatureConfig> {
        self(id)
    }
}

/// A registry serves the unqualified specs of its own feature pack
impl FeatureSpecLoader for FeatureSpecRegistry {
    fn load(&self, id: &SpecId) -> KeelResult<Arc<FeatureSpec>> {
        if id.origin().is_some() {
            return Err(spec_not_found(id));
        }
        self.get(id.name()).cloned().ok_or_else(|| spec_not_found(id))
    }
}

/// Spec loader spanning several feature packs: unqualified ids resolve
/// against the local registry, qualified ids against the registry bound to
/// their origin alias.
#[derive(Debug, Clone, Default)]
pub struct PackSpecLoader {
    local: FeatureSpecRegistry,
    packs: IndexMap<String, FeatureSpecRegistry>,
}

impl PackSpecLoader {
    pub fn new(local: FeatureSpecRegistry) -> Self {
        Self {
            local,
            packs: IndexMap::new(),
        }
    }

    /// Bind `alias` to the registry of another feature pack
    pub fn with_pack(mut self, alias: impl Into<String>, registry: FeatureSpecRegistry) -> Self {
        self.packs.insert(alias.into(), registry);
        self
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }
}

impl FeatureSpecLoader for PackSpecLoader {
    fn load(&self, id: &SpecId) -> KeelResult<Arc<FeatureSpec>> {
        let registry = match id.origin() {
            Some(origin) => self.packs.get(origin).ok_or_else(|| spec_not_found(id))?,
            None => &self.local,
        };
        registry.get(id.name()).cloned().ok_or_else(|| spec_not_found(id))
    }
}

/// Group loader for configs that do not use groups
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroupLoader;

impl FeatureGroupLoader for NoGroupLoader {
    fn load(&self, origin: Option<&str>, name: &str) -> KeelResult<Arc<FeatureGroupSpec>> {
        Err(group_not_found(origin, name))
    }
}

/// Feature loader for configs without stand-alone features
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeatureLoader;

impl FeatureConfigLoader for NoFeatureLoader {
    fn load(&self, id: &FeatureId) -> KeelResult<FeatureConfig> {
        Err(KeelError::FeatureNotFound { id: id.to_string() })
    }
}

/// Groups held in memory, keyed by origin alias and name
#[derive(Debug, Clone, Default)]
pub struct MemoryGroupLoader {
    groups: HashMap<(Option<String>, String), Arc<FeatureGroupSpec>>,
}

impl MemoryGroupLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group of the local feature pack under its own name
    pub fn with_group(mut self, group: FeatureGroupSpec) -> Self {
        self.groups.insert((None, group.name.clone()), Arc::new(group));
        self
    }

    /// Register a group of the feature pack aliased `origin`
    pub fn with_external_group(mut self, origin: impl Into<String>, group: FeatureGroupSpec) -> Self {
        self.groups
            .insert((Some(origin.into()), group.name.clone()), Arc::new(group));
        self
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FeatureGroupLoader for MemoryGroupLoader {
    fn load(&self, origin: Option<&str>, name: &str) -> KeelResult<Arc<FeatureGroupSpec>> {
        self.groups
            .get(&(origin.map(str::to_string), name.to_string()))
            .cloned()
            .ok_or_else(|| group_not_found(origin, name))
    }
}

/// Stand-alone feature configs held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryFeatureLoader {
    features: HashMap<FeatureId, FeatureConfig>,
}

impl MemoryFeatureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, id: FeatureId, config: FeatureConfig) -> Self {
        self.features.insert(id, config);
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FeatureConfigLoader for MemoryFeatureLoader {
    fn load(&self, id: &FeatureId) -> KeelResult<FeatureConfig> {
        self.features
            .get(id)
            .cloned()
            .ok_or_else(|| KeelError::FeatureNotFound { id: id.to_string() })
    }
}

fn spec_not_found(id: &SpecId) -> KeelError {
    KeelError::SpecNotFound {
        spec: id.to_string(),
    }
}

fn group_not_found(origin: Option<&str>, name: &str) -> KeelError {
    let group = match origin {
        Some(origin) => format!("{}#{}", origin, name),
        None => name.to_string(),
    };
    KeelError::GroupNotFound { group }
}
