//! Override stack consulted while walking nested feature groups.

use keel_config::FeatureGroupConfig;
use keel_core::types::{FeatureId, SpecId};

/// Edges currently being walked, outermost first.
///
/// Exclusions of an edge, including the implicit exclusion of an edge that
/// does not inherit features, apply to everything reached through it.
#[derive(Debug, Clone, Default)]
pub struct OverrideStack {
    edges: Vec<FeatureGroupConfig>,
}

impl OverrideStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// `edge` must already be qualified by the scope it is evaluated in
    pub fn push(&mut self, edge: FeatureGroupConfig) {
        self.edges.push(edge);
    }

    pub fn pop(&mut self) -> Option<FeatureGroupConfig> {
        self.edges.pop()
    }

    pub fn depth(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether any active edge drops the feature.
    ///
    /// `id` is `None` for features of specs without identity; they can only
    /// be excluded through their spec. `parent_ref` is set for nested
    /// features.
    pub fn is_excluded(&self, spec: &SpecId, id: Option<&FeatureId>, parent_ref: Option<&str>) -> bool {
        self.excluding_edge(spec, id, parent_ref).is_some()
    }

    /// Outermost edge that drops every feature of `spec`, decided before the
    /// spec is loaded
    pub fn excluding_spec_edge(&self, spec: &SpecId) -> Option<&FeatureGroupConfig> {
        self.edges.iter().find(|edge| edge.excludes_spec(spec))
    }

    /// Outermost edge that drops the feature
    pub fn excluding_edge(
        &self,
        spec: &SpecId,
        id: Option<&FeatureId>,
        parent_ref: Option<&str>,
    ) -> Option<&FeatureGroupConfig> {
        self.edges.iter().find(|edge| {
            if !edge.admits(spec, id) {
                return true;
            }
            match id {
                Some(id) => edge.excludes_feature(id, parent_ref),
                None => edge.is_spec_excluded(spec),
            }
        })
    }
}
