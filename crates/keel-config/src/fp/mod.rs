//! Feature-pack dependencies and package selection.
//!
//! The same feature pack is often reached along several dependency paths.
//! [`FeaturePackConfig::merge`] combines the package selections of two such
//! paths; [`FeaturePackConfig::enforce`] lets a consumer replace a selection
//! outright.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use keel_core::error::KeelError;
use keel_core::types::FeaturePackCoord;

use crate::ConfigResult;

/// Package selection for one feature pack dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeaturePackConfig {
    coord: FeaturePackCoord,
    inherit_packages: bool,
    included_packages: IndexSet<String>,
    excluded_packages: IndexSet<String>,
}

impl FeaturePackConfig {
    /// Dependency that inherits the pack's default packages unchanged
    pub fn new(coord: FeaturePackCoord) -> Self {
        Self::builder(coord).build()
    }

    pub fn builder(coord: FeaturePackCoord) -> FeaturePackConfigBuilder {
        FeaturePackConfigBuilder {
            config: Self {
                coord,
                inherit_packages: true,
                included_packages: IndexSet::new(),
                excluded_packages: IndexSet::new(),
            },
        }
    }

    pub fn coord(&self) -> &FeaturePackCoord {
        &self.coord
    }

    pub fn inherit_packages(&self) -> bool {
        self.inherit_packages
    }

    pub fn included_packages(&self) -> &IndexSet<String> {
        &self.included_packages
    }

    pub fn excluded_packages(&self) -> &IndexSet<String> {
        &self.excluded_packages
    }

    pub fn is_package_included(&self, package: &str) -> bool {
        self.included_packages.contains(package)
    }

    pub fn is_package_excluded(&self, package: &str) -> bool {
        self.excluded_packages.contains(package)
    }

    /// Combine the selections of two paths to the same feature pack.
    ///
    /// An exclusion survives only if both sides exclude the package, unless
    /// one side does not inherit defaults at all: then the inheriting side's
    /// exclusions apply minus whatever the other side explicitly includes.
    pub fn merge(&self, other: &FeaturePackConfig) -> ConfigResult<FeaturePackConfig> {
        self.check_same_coord(other)?;

        let (inherit, included, excluded) = match (self.inherit_packages, other.inherit_packages) {
            (true, false) => {
                let excluded = self
                    .excluded_packages
                    .difference(&other.included_packages)
                    .cloned()
                    .collect();
                let included = self
                    .included_packages
                    .union(&other.included_packages)
                    .cloned()
                    .collect();
                (true, included, excluded)
            },
            (false, true) => {
                let excluded = other
                    .excluded_packages
                    .difference(&self.included_packages)
                    .cloned()
                    .collect();
                (true, self.included_packages.clone(), excluded)
            },
            (inherit, _) => {
                let excluded = self
                    .excluded_packages
                    .intersection(&other.excluded_packages)
                    .filter(|p| !other.included_packages.contains(*p))
                    .cloned()
                    .collect();
                let included = self
                    .included_packages
                    .union(&other.included_packages)
                    .cloned()
                    .collect();
                (inherit, included, excluded)
            },
        };

        Ok(FeaturePackConfig {
            coord: self.coord.clone(),
            inherit_packages: inherit,
            included_packages: included,
            excluded_packages: excluded,
        })
    }

    /// Replace this selection with `other`'s
    pub fn enforce(&self, other: &FeaturePackConfig) -> ConfigResult<FeaturePackConfig> {
        self.check_same_coord(other)?;
        Ok(FeaturePackConfig {
            coord: self.coord.clone(),
            inherit_packages: other.inherit_packages,
            included_packages: other.included_packages.clone(),
            excluded_packages: other.excluded_packages.clone(),
        })
    }

    /// Drop includes that an inheriting selection gets from `defaults` anyway
    pub fn normalize(&self, defaults: &IndexSet<String>) -> FeaturePackConfig {
        let mut normalized = self.clone();
        if self.inherit_packages {
            normalized.included_packages.retain(|p| !defaults.contains(p));
        }
        normalized
    }

    /// Packages selected from a pack whose default packages are `defaults`
    pub fn effective_packages(&self, defaults: &IndexSet<String>) -> IndexSet<String> {
        let mut packages = IndexSet::new();
        if self.inherit_packages {
            packages.extend(
                defaults
                    .iter()
                    .filter(|p| !self.excluded_packages.contains(*p))
                    .cloned(),
            );
        }
        packages.extend(self.included_packages.iter().cloned());
        packages
    }

    fn check_same_coord(&self, other: &FeaturePackConfig) -> ConfigResult<()> {
        if self.coord != other.coord {
            return Err(KeelError::conflict(
                self.coord.to_string(),
                format!("cannot combine with '{}'", other.coord),
            ));
        }
        Ok(())
    }
}

/// Builder for [`FeaturePackConfig`]; includes and excludes stay disjoint
#[derive(Debug, Clone)]
pub struct FeaturePackConfigBuilder {
    config: FeaturePackConfig,
}

impl FeaturePackConfigBuilder {
    pub fn inherit_packages(mut self, inherit: bool) -> Self {
        self.config.inherit_packages = inherit;
        self
    }

    pub fn include_package(mut self, package: impl Into<String>) -> ConfigResult<Self> {
        let package = package.into();
        if self.config.excluded_packages.contains(&package) {
            return Err(KeelError::conflict(
                format!("package '{}' of {}", package, self.config.coord),
                "package is already excluded",
            ));
        }
        self.config.included_packages.insert(package);
        Ok(self)
    }

    pub fn exclude_package(mut self, package: impl Into<String>) -> ConfigResult<Self> {
        let package = package.into();
        if self.config.included_packages.contains(&package) {
            return Err(KeelError::conflict(
                format!("package '{}' of {}", package, self.config.coord),
                "package is already included",
            ));
        }
        self.config.excluded_packages.insert(package);
        Ok(self)
    }

    pub fn build(self) -> FeaturePackConfig {
        self.config
    }
}

/// Feature-pack dependencies of a project or feature pack, keyed by
/// unversioned coordinate, each optionally reachable through an alias
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeaturePackDepsConfig {
    deps: IndexMap<FeaturePackCoord, FeaturePackConfig>,
    aliases: IndexMap<String, FeaturePackCoord>,
}

impl FeaturePackDepsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dependency; the pack and the alias must both be new
    pub fn add(&mut self, alias: Option<&str>, config: FeaturePackConfig) -> ConfigResult<()> {
        let key = config.coord().without_version();
        if self.deps.contains_key(&key) {
            return Err(KeelError::conflict(
                config.coord().to_string(),
                "feature pack is already a dependency",
            ));
        }
        if let Some(alias) = alias {
            if self.aliases.contains_key(alias) {
                return Err(KeelError::conflict(
                    format!("alias '{}'", alias),
                    "alias is already bound to another feature pack",
                ));
            }
            self.aliases.insert(alias.to_string(), key.clone());
        }
        self.deps.insert(key, config);
        Ok(())
    }

    /// Add the dependency, merging with an existing entry for the same pack
    pub fn merge_dependency(&mut self, config: FeaturePackConfig) -> ConfigResult<()> {
        let key = config.coord().without_version();
        match self.deps.get_mut(&key) {
            Some(existing) => *existing = existing.merge(&config)?,
            None => {
                self.deps.insert(key, config);
            },
        }
        Ok(())
    }

    /// Add the dependency, replacing the selection of an existing entry
    pub fn enforce_dependency(&mut self, config: FeaturePackConfig) -> ConfigResult<()> {
        let key = config.coord().without_version();
        match self.deps.get_mut(&key) {
            Some(existing) => *existing = existing.enforce(&config)?,
            None => {
                self.deps.insert(key, config);
            },
        }
        Ok(())
    }

    /// Merge every dependency and alias of `other` into this config
    pub fn merge(&mut self, other: &FeaturePackDepsConfig) -> ConfigResult<()> {
        for config in other.deps.values() {
            self.merge_dependency(config.clone())?;
        }
        for (alias, key) in &other.aliases {
            match self.aliases.get(alias) {
                Some(bound) if bound != key => {
                    return Err(KeelError::conflict(
                        format!("alias '{}'", alias),
                        format!("bound to both '{}' and '{}'", bound, key),
                    ));
                },
                Some(_) => {},
                None => {
                    self.aliases.insert(alias.clone(), key.clone());
                },
            }
        }
        Ok(())
    }

    /// Dependency on the same pack as `coord`, whatever its version
    pub fn get(&self, coord: &FeaturePackCoord) -> Option<&FeaturePackConfig> {
        self.deps.get(&coord.without_version())
    }

    pub fn by_alias(&self, alias: &str) -> Option<&FeaturePackConfig> {
        self.aliases.get(alias).and_then(|key| self.deps.get(key))
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    pub fn alias_of(&self, coord: &FeaturePackCoord) -> Option<&str> {
        let key = coord.without_version();
        self.aliases
            .iter()
            .find(|(_, bound)| **bound == key)
            .map(|(alias, _)| alias.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// Dependencies in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FeaturePackConfig> {
        self.deps.values()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> FeaturePackCoord {
        FeaturePackCoord::new("org.keel", "core", "1.0")
    }

    fn packages(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_merge_asymmetric() {
        let a = FeaturePackConfig::builder(coord())
            .inherit_packages(false)
            .include_package("p1")
            .unwrap()
            .build();
        let b = FeaturePackConfig::builder(coord())
            .include_package("p2")
            .unwrap()
            .exclude_package("p1")
            .unwrap()
            .exclude_package("p3")
            .unwrap()
            .build();

        let merged = a.merge(&b).unwrap();
        assert!(merged.inherit_packages());
        assert_eq!(merged.included_packages(), &packages(&["p1"]));
        assert_eq!(merged.excluded_packages(), &packages(&["p3"]));
    }

    #[test]
    fn test_merge_inheriting_into_non_inheriting() {
        let a = FeaturePackConfig::builder(coord())
            .exclude_package("p1")
            .unwrap()
            .exclude_package("p2")
            .unwrap()
            .build();
        let b = FeaturePackConfig::builder(coord())
            .inherit_packages(false)
            .include_package("p2")
            .unwrap()
            .build();

        let merged = a.merge(&b).unwrap();
        assert!(merged.inherit_packages());
        assert_eq!(merged.excluded_packages(), &packages(&["p1"]));
        assert_eq!(merged.included_packages(), &packages(&["p2"]));
    }

    #[test]
    fn test_merge_keeps_common_exclusions() {
        let a = FeaturePackConfig::builder(coord())
            .exclude_package("p1")
            .unwrap()
            .exclude_package("p2")
            .unwrap()
            .build();
        let b = FeaturePackConfig::builder(coord())
            .exclude_package("p2")
            .unwrap()
            .exclude_package("p3")
            .unwrap()
            .build();

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.excluded_packages(), &packages(&["p2"]));
        assert!(merged.included_packages().is_empty());
    }

    #[test]
    fn test_merge_version_mismatch() {
        let a = FeaturePackConfig::new(coord());
        let b = FeaturePackConfig::new(FeaturePackCoord::new("org.keel", "core", "2.0"));
        let err = a.merge(&b).unwrap_err();
        assert!(matches!(err, KeelError::ConfigConflict { .. }));
        assert!(a.enforce(&b).is_err());
    }

    #[test]
    fn test_enforce_replaces_selection() {
        let a = FeaturePackConfig::builder(coord())
            .exclude_package("p1")
            .unwrap()
            .build();
        let b = FeaturePackConfig::builder(coord())
            .inherit_packages(false)
            .include_package("p2")
            .unwrap()
            .build();

        let enforced = a.enforce(&b).unwrap();
        assert!(!enforced.inherit_packages());
        assert_eq!(enforced.included_packages(), &packages(&["p2"]));
        assert!(enforced.excluded_packages().is_empty());
    }

    #[test]
    fn test_include_exclude_disjoint() {
        let err = FeaturePackConfig::builder(coord())
            .include_package("p1")
            .unwrap()
            .exclude_package("p1")
            .unwrap_err();
        assert!(matches!(err, KeelError::ConfigConflict { .. }));
    }

    #[test]
    fn test_normalize_and_effective_packages() {
        let defaults = packages(&["p1", "p2"]);
        let config = FeaturePackConfig::builder(coord())
            .include_package("p1")
            .unwrap()
            .include_package("p9")
            .unwrap()
            .exclude_package("p2")
            .unwrap()
            .build();

        let normalized = config.normalize(&defaults);
        assert_eq!(normalized.included_packages(), &packages(&["p9"]));
        assert_eq!(config.effective_packages(&defaults), packages(&["p1", "p9"]));

        let explicit = FeaturePackConfig::builder(coord())
            .inherit_packages(false)
            .include_package("p1")
            .unwrap()
            .build();
        assert_eq!(explicit.normalize(&defaults), explicit);
        assert_eq!(explicit.effective_packages(&defaults), packages(&["p1"]));
    }

    #[test]
    fn test_deps_add_rejects_duplicates() {
        let mut deps = FeaturePackDepsConfig::new();
        deps.add(Some("core"), FeaturePackConfig::new(coord())).unwrap();

        let other_version = FeaturePackCoord::new("org.keel", "core", "2.0");
        assert!(deps.add(None, FeaturePackConfig::new(other_version)).is_err());

        let web = FeaturePackCoord::new("org.keel", "web", "1.0");
        assert!(deps.add(Some("core"), FeaturePackConfig::new(web.clone())).is_err());
        deps.add(Some("web"), FeaturePackConfig::new(web.clone())).unwrap();

        assert_eq!(deps.len(), 2);
        assert_eq!(deps.by_alias("web").unwrap().coord(), &web);
        assert_eq!(deps.alias_of(&coord()), Some("core"));
        assert_eq!(deps.aliases().collect::<Vec<_>>(), vec!["core", "web"]);
    }

    #[test]
    fn test_deps_merge_and_enforce_dependency() {
        let mut deps = FeaturePackDepsConfig::new();
        deps.add(
            Some("core"),
            FeaturePackConfig::builder(coord())
                .exclude_package("p1")
                .unwrap()
                .build(),
        )
        .unwrap();

        deps.merge_dependency(FeaturePackConfig::new(coord())).unwrap();
        assert!(deps.get(&coord()).unwrap().excluded_packages().is_empty());

        deps.enforce_dependency(
            FeaturePackConfig::builder(coord())
                .exclude_package("p2")
                .unwrap()
                .build(),
        )
        .unwrap();
        assert!(deps.by_alias("core").unwrap().is_package_excluded("p2"));
    }

    #[test]
    fn test_deps_merge_alias_conflict() {
        let mut left = FeaturePackDepsConfig::new();
        left.add(Some("x"), FeaturePackConfig::new(coord())).unwrap();

        let mut right = FeaturePackDepsConfig::new();
        let web = FeaturePackCoord::new("org.keel", "web", "1.0");
        right.add(Some("x"), FeaturePackConfig::new(web)).unwrap();

        assert!(left.merge(&right).is_err());
    }

    #[test]
    fn test_deps_merge_combines() {
        let mut left = FeaturePackDepsConfig::new();
        left.add(Some("core"), FeaturePackConfig::new(coord())).unwrap();

        let mut right = FeaturePackDepsConfig::new();
        right.add(Some("core"), FeaturePackConfig::new(coord())).unwrap();
        let web = FeaturePackCoord::new("org.keel", "web", "1.0");
        right.add(Some("web"), FeaturePackConfig::new(web)).unwrap();

        left.merge(&right).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.has_alias("web"));
    }
}
