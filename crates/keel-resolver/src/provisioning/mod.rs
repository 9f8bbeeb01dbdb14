//! Resolution of every named config declared by a set of config models.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use keel_config::{ConfigId, ConfigModel, FeaturePackDepsConfig, ResolverSettings};
use keel_core::error::KeelResult;

use crate::builder::MainConfigBuilder;
use crate::loader::{
    FeatureConfigLoader, FeatureGroupLoader, FeatureSpecLoader, NoFeatureLoader, NoGroupLoader,
};
use crate::resolved::ResolvedConfig;

/// Layers config models and resolves each named config with its own
/// [`MainConfigBuilder`]
pub struct ConfigModelResolver {
    spec_loader: Arc<dyn FeatureSpecLoader>,
    group_loader: Arc<dyn FeatureGroupLoader>,
    feature_loader: Arc<dyn FeatureConfigLoader>,
    settings: ResolverSettings,
    known_aliases: Option<IndexSet<String>>,
}

impl ConfigModelResolver {
    pub fn new(spec_loader: Arc<dyn FeatureSpecLoader>) -> Self {
        Self {
            spec_loader,
            group_loader: Arc::new(NoGroupLoader),
            feature_loader: Arc::new(NoFeatureLoader),
            settings: ResolverSettings::default(),
            known_aliases: None,
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

    pub fn with_feature_pack_deps(mut self, deps: &FeaturePackDepsConfig) -> Self {
        self.known_aliases = Some(deps.aliases().map(str::to_string).collect());
        self
    }

    /// Fresh builder sharing this resolver's loaders and settings
    pub fn builder(&self) -> MainConfigBuilder {
        let builder = MainConfigBuilder::new(Arc::clone(&self.spec_loader))
            .with_group_loader(Arc::clone(&self.group_loader))
            .with_feature_loader(Arc::clone(&self.feature_loader))
            .with_settings(self.settings.clone());
        match &self.known_aliases {
            Some(aliases) => builder.with_known_aliases(aliases.iter().cloned()),
            None => builder,
        }
    }

    /// Resolve every named config in first-seen order.
    ///
    /// Each named config starts from the anonymous layers of its model,
    /// followed by every layer carrying its id, both in input order.
    pub fn resolve(&self, models: &[ConfigModel]) -> KeelResult<Vec<ResolvedConfig>> {
        let mut layers: IndexMap<ConfigId, Vec<&ConfigModel>> = IndexMap::new();
        let mut anonymous: IndexMap<&str, Vec<&ConfigModel>> = IndexMap::new();
        for model in models {
            if model.is_anonymous() {
                anonymous.entry(model.model()).or_default().push(model);
            } else {
                layers.entry(model.id.clone()).or_default().push(model);
            }
        }

        let mut resolved = Vec::with_capacity(layers.len());
        for (id, named) in layers {
            let base = anonymous.get(id.model.as_str()).map(Vec::as_slice).unwrap_or_default();
            debug!(
                "Resolving config {} from {} anonymous and {} named layer(s)",
                id,
                base.len(),
                named.len()
            );

            let mut builder = self.builder();
            for layer in base.iter().chain(named.iter()) {
                builder.add_config_model(layer)?;
            }
            resolved.push(builder.build()?);
        }
        Ok(resolved)
    }
}
