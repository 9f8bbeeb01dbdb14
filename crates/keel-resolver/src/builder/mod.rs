//! Main configuration builder.
//!
//! Collects features from config models, feature groups and explicit calls,
//! applies include/exclude overrides, merges repeated features and finally
//! lines everything up in an order where each feature comes after the
//! features it references or depends on.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use petgraph::graph::NodeIndex;
use tracing::{debug, trace, warn};

use keel_config::{ConfigId, ConfigModel, FeatureGroupConfig, FeatureGroupSpec, FeaturePackDepsConfig, ResolverSettings};
use keel_core::error::{KeelError, KeelResult};
use keel_core::types::{validate_reference, FeatureConfig, FeatureId, FeatureSpec, SpecId};

use crate::graph::{FeatureEdge, FeatureGraph, FeatureNode};
use crate::loader::{
    FeatureConfigLoader, FeatureGroupLoader, FeatureSpecLoader, NoFeatureLoader, NoGroupLoader,
};
use crate::overrides::OverrideStack;
use crate::resolved::{ResolvedConfig, ResolvedFeature};


/// What to do when a feature with the same identity was already added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Fail with [`KeelError::DuplicateFeature`]
    Add,
    /// Merge into the existing feature
    AddOrOverwrite,
}

type Observer = Box<dyn FnMut(&ResolvedFeature)>;

/// Feature a nested feature is being added under
struct Parent {
    spec: Arc<FeatureSpec>,
    config: FeatureConfig,
    id: Option<FeatureId>,
}

/// Builds one resolved configuration
pub struct MainConfigBuilder {
    spec_loader: Arc<dyn FeatureSpecLoader>,
    group_loader: Arc<dyn FeatureGroupLoader>,
    feature_loader: Arc<dyn FeatureConfigLoader>,
    settings: ResolverSettings,
    known_aliases: Option<IndexSet<String>>,
    observer: Option<Observer>,

    config_id: Option<ConfigId>,
    properties: IndexMap<String, String>,
    features: Vec<ResolvedFeature>,
    features_by_id: HashMap<FeatureId, usize>,
    /// Feature indexes per spec, specs in first-seen order
    features_by_spec: IndexMap<SpecId, Vec<usize>>,

    loaded_specs: IndexMap<SpecId, Arc<FeatureSpec>>,
    groups: HashMap<(Option<String>, String), Arc<FeatureGroupSpec>>,
    /// `None` records a feature the loader does not know
    stored_features: HashMap<FeatureId, Option<FeatureConfig>>,

    overrides: OverrideStack,
    /// Origin alias unqualified names are resolved in
    scopes: Vec<Option<String>>,
    /// Labels of the groups being walked, outermost first
    group_stack: Vec<String>,
}

impl MainConfigBuilder {
    /// Builder that loads specs through `spec_loader` and knows no groups or
    /// stand-alone features
    pub fn new(spec_loader: Arc<dyn FeatureSpecLoader>) -> Self {
        Self {
            spec_loader,
            group_loader: Arc::new(NoGroupLoader),
            feature_loader: Arc::new(NoFeatureLoader),
            settings: ResolverSettings::default(),
            known_aliases: None,
            observer: None,
            config_id: None,
            properties: IndexMap::new(),
            features: Vec::new(),
            features_by_id: HashMap::new(),
            features_by_spec: IndexMap::new(),
            loaded_specs: IndexMap::new(),
            groups: HashMap::new(),
            stored_features: HashMap::new(),
            overrides: OverrideStack::new(),
            scopes: Vec::new(),
            group_stack: Vec::new(),
        }
    }

    pub fn with_group_loader(mut self, loader: Arc<dyn FeatureGroupLoader>) -> Self {
        self.group_loader = loader;
        self
    }

    pub fn with_feature_loader(mut self, loader: Arc<dyn FeatureConfigLoader>) -> Self {
        self.feature_loader = loader;
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Restrict origin aliases to those declared by `deps`
    pub fn with_feature_pack_deps(self, deps: &FeaturePackDepsConfig) -> Self {
        self.with_known_aliases(deps.aliases())
    }

    /// Restrict origin aliases to `aliases`
    pub fn with_known_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_aliases = Some(aliases.into_iter().map(Into::into).collect());
        self
    }

    /// Called with each feature as it is lined up by [`build`](Self::build)
    pub fn with_observer(mut self, observer: impl FnMut(&ResolvedFeature) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn config_id(&self) -> Option<&ConfigId> {
        self.config_id.as_ref()
    }

    /// Features added so far, in insertion order
    pub fn features(&self) -> &[ResolvedFeature] {
        &self.features
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&ResolvedFeature> {
        self.features_by_id.get(id).map(|index| &self.features[*index])
    }

    /// Add one layer of a config model: its properties and its body
    pub fn add_config_model(&mut self, model: &ConfigModel) -> KeelResult<()> {
        if let Some(current) = &self.config_id {
            let compatible = current.model == model.id.model
                && (current.is_anonymous() || model.is_anonymous() || *current == model.id);
            if !compatible {
                return Err(KeelError::conflict(
                    format!("config '{}'", current),
                    format!("cannot add a layer of '{}'", model.id),
                ));
            }
        }
        if self.config_id.as_ref().map_or(true, ConfigId::is_anonymous) {
            self.config_id = Some(model.id.clone());
        }

        debug!("Adding config layer {}", model.id);
        self.properties
            .extend(model.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.walk_group(&model.body)
    }

    /// Add every feature of a group, optionally from the feature pack aliased
    /// `origin`
    pub fn add_feature_group(&mut self, origin: Option<&str>, name: &str) -> KeelResult<()> {
        let edge = match origin {
            Some(origin) => FeatureGroupConfig::external(origin, name).build(),
            None => FeatureGroupConfig::new(name),
        };
        self.process_dependency(&edge)
    }

    /// Add a feature; a feature with the same identity must not exist yet
    pub fn add_feature(&mut self, config: FeatureConfig) -> KeelResult<()> {
        self.add_feature_with_mode(config, AddMode::Add)
    }

    pub fn add_feature_with_mode(&mut self, mut config: FeatureConfig, mode: AddMode) -> KeelResult<()> {
        let scope = self.current_scope();
        config.spec = config.spec.qualify(scope.as_deref());
        self.add_feature_internal(config, mode, None)
    }

    /// Follow one dependency edge: a named group or a set of stand-alone
    /// features
    pub fn process_dependency(&mut self, edge: &FeatureGroupConfig) -> KeelResult<()> {
        let scope = self.current_scope();
        let edge = edge.qualified(scope.as_deref());
        if let Some(origin) = edge.origin() {
            self.check_alias(origin)?;
        }

        match edge.name() {
            Some(name) => {
                let name = name.to_string();
                self.process_group_edge(&edge, &name)
            },
            None => self.process_feature_only(&edge),
        }
    }

    fn process_group_edge(&mut self, edge: &FeatureGroupConfig, name: &str) -> KeelResult<()> {
        let label = edge.label();
        if let Some(start) = self.group_stack.iter().position(|group| *group == label) {
            let mut cycle = self.group_stack[start..].to_vec();
            cycle.push(label);
            return Err(KeelError::CircularGroupDependency {
                cycle: cycle.join(" -> "),
            });
        }
        if self.group_stack.len() >= self.settings.max_group_depth {
            return Err(KeelError::GroupDepthExceeded {
                group: label,
                limit: self.settings.max_group_depth,
            });
        }

        let group = self.load_group(edge.origin(), name)?;

        debug!("Entering feature group {} (depth {})", label, self.group_stack.len() + 1);
        self.group_stack.push(label.clone());
        self.scopes.push(edge.origin().map(str::to_string));
        self.overrides.push(edge.clone());

        let result = self.walk_group(&group);

        self.overrides.pop();
        self.scopes.pop();
        self.group_stack.pop();
        debug!("Leaving feature group {}", label);
        result?;

        self.apply_included_features(edge)
    }

    /// Dependencies first, then external blocks in their alias scope, then
    /// the group's own features
    fn walk_group(&mut self, group: &FeatureGroupSpec) -> KeelResult<()> {
        for dependency in &group.dependencies {
            self.process_dependency(dependency)?;
        }

        for (alias, block) in &group.external {
            self.check_alias(alias)?;
            self.scopes.push(Some(alias.clone()));
            let result = self.walk_group(block);
            self.scopes.pop();
            result?;
        }

        let scope = self.current_scope();
        for feature in &group.features {
            let mut config = feature.clone();
            config.spec = config.spec.qualify(scope.as_deref());
            self.add_feature_internal(config, AddMode::AddOrOverwrite, None)?;
        }
        Ok(())
    }

    /// Customizations an edge carries for features of the group it pulled in
    fn apply_included_features(&mut self, edge: &FeatureGroupConfig) -> KeelResult<()> {
        for (id, body) in edge.included_features() {
            let Some(body) = body else {
                continue;
            };
            if self.overrides.is_excluded(id.spec(), Some(id), None) {
                debug!("Skipping override of excluded feature {}", id);
                continue;
            }
            self.add_feature_internal(body.clone(), AddMode::AddOrOverwrite, None)?;
        }
        Ok(())
    }

    fn process_feature_only(&mut self, edge: &FeatureGroupConfig) -> KeelResult<()> {
        for (id, body) in edge.included_features() {
            if self.overrides.is_excluded(id.spec(), Some(id), None) {
                debug!("Excluded feature {}", id);
                continue;
            }

            let config = if self.features_by_id.contains_key(id) {
                match body {
                    Some(body) => body.clone(),
                    None => continue,
                }
            } else {
                match (self.load_stored_feature(id), body) {
                    (Ok(mut stored), Some(body)) => {
                        stored.merge(body.clone());
                        stored
                    },
                    (Ok(stored), None) => stored,
                    (Err(KeelError::FeatureNotFound { .. }), Some(body))
                        if self.settings.allow_inline_feature_bodies =>
                    {
                        warn!("No stored config for feature {}, using the inline body", id);
                        body.clone()
                    },
                    (Err(err), _) => return Err(err),
                }
            };

            self.add_feature_internal(config, AddMode::AddOrOverwrite, None)?;
        }
        Ok(())
    }

    /// `config.spec` must already be qualified
    fn add_feature_internal(
        &mut self,
        mut config: FeatureConfig,
        mode: AddMode,
        parent: Option<&Parent>,
    ) -> KeelResult<()> {
        if let Some(edge) = self.overrides.excluding_spec_edge(&config.spec) {
            debug!("Excluded feature {} through {}", config.describe(), edge.label());
            return Ok(());
        }

        let spec = self.load_spec(&config.spec)?;
        let nested = std::mem::take(&mut config.nested);

        let parent_ref = match parent {
            Some(parent) => {
                let parent_ref = config
                    .parent_ref
                    .clone()
                    .unwrap_or_else(|| parent.spec.name().to_string());
                inherit_parent_values(&spec, &mut config, parent, &parent_ref)?;
                Some(parent_ref)
            },
            None => None,
        };

        spec.check_known_params(&config)?;
        let id = spec.derive_feature_id(&config.spec, &config)?;

        if let Some(edge) = self
            .overrides
            .excluding_edge(&config.spec, id.as_ref(), parent_ref.as_deref())
        {
            debug!("Excluded feature {} through {}", config.describe(), edge.label());
            return Ok(());
        }

        let existing = id.as_ref().and_then(|id| self.features_by_id.get(id).copied());
        let index = match existing {
            Some(index) => {
                if mode == AddMode::Add {
                    return Err(KeelError::DuplicateFeature {
                        id: self.features[index].label(),
                    });
                }
                debug!("Merging into feature {}", self.features[index].label());
                self.features[index].config.merge(config);
                index
            },
            None => self.register(id, config, parent.and_then(|p| p.id.clone())),
        };

        if nested.is_empty() {
            return Ok(());
        }

        let feature = &self.features[index];
        let parent = Parent {
            spec,
            config: feature.config.clone(),
            id: feature.id.clone(),
        };
        let origin = feature.spec.origin().map(str::to_string);
        for mut child in nested {
            child.spec = child.spec.qualify(origin.as_deref());
            self.add_feature_internal(child, AddMode::AddOrOverwrite, Some(&parent))?;
        }
        Ok(())
    }

    fn register(&mut self, id: Option<FeatureId>, config: FeatureConfig, parent: Option<FeatureId>) -> usize {
        let index = self.features.len();
        debug!("Added feature {}", config.describe());

        if let Some(id) = &id {
            self.features_by_id.insert(id.clone(), index);
        }
        self.features_by_spec
            .entry(config.spec.clone())
            .or_default()
            .push(index);
        self.features.push(ResolvedFeature {
            id,
            spec: config.spec.clone(),
            config,
            parent,
        });
        index
    }

    /// Validate, order and emit the configuration
    pub fn build(mut self) -> KeelResult<ResolvedConfig> {
        self.validate_loaded_specs()?;

        for feature in &self.features {
            self.spec_of(feature)?.check_required_params(&feature.config)?;
        }

        let (graph, nodes) = self.feature_graph()?;
        if let Err(cycle) = graph.detect_cycles() {
            return Err(KeelError::CyclicReference {
                cycle: graph.format_cycle(&cycle),
            });
        }

        let roots: Vec<NodeIndex> = self
            .features_by_spec
            .values()
            .flatten()
            .map(|index| nodes[*index])
            .collect();
        let order = graph.line_up(roots);

        let Self {
            features,
            properties,
            config_id,
            mut observer,
            settings,
            ..
        } = self;

        let mut slots: Vec<Option<ResolvedFeature>> = features.into_iter().map(Some).collect();
        let mut lined_up = Vec::with_capacity(slots.len());
        for node in order {
            let Some(index) = graph.node(node).map(|node| node.index) else {
                continue;
            };
            let Some(feature) = slots[index].take() else {
                continue;
            };
            if settings.trace_line_up {
                debug!("Lined up {}", feature.label());
            } else {
                trace!("Lined up {}", feature.label());
            }
            if let Some(observer) = observer.as_mut() {
                observer(&feature);
            }
            lined_up.push(feature);
        }

        debug!(
            "Built configuration {} with {} features",
            config_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<unnamed>".to_string()),
            lined_up.len()
        );

        Ok(ResolvedConfig {
            id: config_id,
            properties,
            features: lined_up,
        })
    }

    /// Reference integrity of every spec a resolved feature uses; references
    /// into other feature packs are only checked here
    fn validate_loaded_specs(&mut self) -> KeelResult<()> {
        let specs: Vec<(SpecId, Arc<FeatureSpec>)> = self
            .features_by_spec
            .keys()
            .filter_map(|id| self.loaded_specs.get(id).map(|spec| (id.clone(), Arc::clone(spec))))
            .collect();

        for (id, spec) in specs {
            for reference in spec.references() {
                let target_id = reference.target.qualify(id.origin());
                let target = match self.load_spec(&target_id) {
                    Ok(target) => Some(target),
                    Err(KeelError::SpecNotFound { .. }) => None,
                    Err(err) => return Err(err),
                };
                validate_reference(&spec, reference, target.as_deref())?;
            }
        }
        Ok(())
    }

    fn feature_graph(&self) -> KeelResult<(FeatureGraph, Vec<NodeIndex>)> {
        let mut graph = FeatureGraph::new();
        let nodes: Vec<NodeIndex> = self
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| {
                graph.add_feature(FeatureNode {
                    index,
                    id: feature.id.clone(),
                    label: feature.label(),
                })
            })
            .collect();

        for (index, feature) in self.features.iter().enumerate() {
            let spec = self.spec_of(feature)?;

            for reference in spec.references() {
                let Some(target) = spec.resolve_reference_target(&feature.spec, reference, &feature.config)?
                else {
                    continue;
                };
                if feature.id.as_ref() == Some(&target) {
                    continue;
                }
                let Some(&target_index) = self.features_by_id.get(&target) else {
                    return Err(KeelError::UnresolvedReference {
                        feature: feature.label(),
                        reference: reference.name.clone(),
                        target: target.to_string(),
                    });
                };
                graph.add_edge(
                    nodes[index],
                    nodes[target_index],
                    FeatureEdge::Reference(reference.name.clone()),
                );
            }

            for dependency in &feature.config.dependencies {
                let dependency = dependency.qualify(feature.spec.origin());
                let Some(&target_index) = self.features_by_id.get(&dependency) else {
                    return Err(KeelError::UnsatisfiedDependency {
                        feature: feature.label(),
                        dependency: dependency.to_string(),
                    });
                };
                graph.add_edge(nodes[index], nodes[target_index], FeatureEdge::Dependency);
            }
        }

        Ok((graph, nodes))
    }

    fn spec_of(&self, feature: &ResolvedFeature) -> KeelResult<&Arc<FeatureSpec>> {
        self.loaded_specs
            .get(&feature.spec)
            .ok_or_else(|| KeelError::SpecNotFound {
                spec: feature.spec.to_string(),
            })
    }

    fn current_scope(&self) -> Option<String> {
        self.scopes.last().cloned().flatten()
    }

    fn check_alias(&self, alias: &str) -> KeelResult<()> {
        match &self.known_aliases {
            Some(known) if !known.contains(alias) => Err(KeelError::UnknownFeaturePackAlias {
                alias: alias.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn load_spec(&mut self, id: &SpecId) -> KeelResult<Arc<FeatureSpec>> {
        if let Some(spec) = self.loaded_specs.get(id) {
            return Ok(Arc::clone(spec));
        }
        trace!("Loading feature spec {}", id);
        let spec = self.spec_loader.load(id)?;
        self.loaded_specs.insert(id.clone(), Arc::clone(&spec));
        Ok(spec)
    }

    fn load_group(&mut self, origin: Option<&str>, name: &str) -> KeelResult<Arc<FeatureGroupSpec>> {
        let key = (origin.map(str::to_string), name.to_string());
        if let Some(group) = self.groups.get(&key) {
            return Ok(Arc::clone(group));
        }
        trace!("Loading feature group {}", name);
        let group = self.group_loader.load(origin, name)?;
        self.groups.insert(key, Arc::clone(&group));
        Ok(group)
    }

    /// Stored config of a stand-alone feature, with the id's values filled in
    fn load_stored_feature(&mut self, id: &FeatureId) -> KeelResult<FeatureConfig> {
        if let Some(cached) = self.stored_features.get(id) {
            return cached
                .clone()
                .ok_or_else(|| KeelError::FeatureNotFound { id: id.to_string() });
        }

        trace!("Loading feature {}", id);
        match self.feature_loader.load(id) {
            Ok(stored) => {
                let mut config = FeatureConfig::from_id(id);
                config.merge(stored);
                self.stored_features.insert(id.clone(), Some(config.clone()));
                Ok(config)
            },
            Err(err @ KeelError::FeatureNotFound { .. }) => {
                self.stored_features.insert(id.clone(), None);
                Err(err)
            },
            Err(err) => Err(err),
        }
    }
}

/// Copy ID values from the parent into a nested feature through the
/// parent-ref mapping; an explicit, different value is a conflict
fn inherit_parent_values(
    spec: &FeatureSpec,
    config: &mut FeatureConfig,
    parent: &Parent,
    parent_ref: &str,
) -> KeelResult<()> {
    for (child_param, parent_param) in spec.parent_mapping(parent_ref, &parent.spec) {
        let Some(inherited) = parent.spec.param_value(&parent_param, &parent.config) else {
            continue;
        };
        match config.params.get(&child_param) {
            Some(declared) if declared != inherited => {
                return Err(KeelError::ConflictingIdentity {
                    spec: config.spec.to_string(),
                    param: child_param,
                    inherited: inherited.to_string(),
                    declared: declared.clone(),
                });
            },
            Some(_) => {},
            None => {
                config.params.insert(child_param, inherited.to_string());
            },
        }
    }
    Ok(())
}
