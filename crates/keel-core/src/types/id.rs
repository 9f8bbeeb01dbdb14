//! Identifier types for feature specs and resolved features.
//!
//! Both identifiers serialize to their textual form (`alias#name` and
//! `spec:k=v,...`) so they can be used as map keys in serialized output.
//! Inside a feature id, `\`, `:`, `,` and `=` are escaped with a backslash.

use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KeelError, KeelResult};

/// Separator between a feature-pack alias and a spec name
pub const ORIGIN_SEPARATOR: char = '#';

const ESCAPE: char = '\\';

/// Identifier of a feature spec, optionally qualified by the alias of the
/// feature pack it originates from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecId {
    origin: Option<String>,
    name: String,
}

impl SpecId {
    /// Create an unqualified spec id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            origin: None,
            name: name.into(),
        }
    }

    /// Create a spec id qualified by a feature-pack alias
    pub fn with_origin(origin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            name: name.into(),
        }
    }

    /// Parse `"alias#name"` or `"name"`
    pub fn parse(input: &str) -> KeelResult<Self> {
        let invalid = |reason: &str| KeelError::InvalidSpecId {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        match input.split_once(ORIGIN_SEPARATOR) {
            None if input.is_empty() => Err(invalid("spec name is empty")),
            None => Ok(Self::new(input)),
            Some((origin, name)) => {
                if origin.is_empty() {
                    return Err(invalid("feature-pack alias is empty"));
                }
                if name.is_empty() {
                    return Err(invalid("spec name is empty"));
                }
                if name.contains(ORIGIN_SEPARATOR) {
                    return Err(invalid("more than one '#' separator"));
                }
                Ok(Self::with_origin(origin, name))
            },
        }
    }

    /// Check that this id is what [`SpecId::parse`] would produce for its
    /// textual form
    pub fn validate(&self) -> KeelResult<()> {
        Self::parse(&self.to_string()).and_then(|parsed| {
            if parsed == *self {
                Ok(())
            } else {
                Err(KeelError::InvalidSpecId {
                    input: self.to_string(),
                    reason: format!("'{}' is not a valid spec name", self.name),
                })
            }
        })
    }

    /// Alias of the originating feature pack, if any
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Spec name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fill in `origin` when this id has none
    pub fn qualify(&self, origin: Option<&str>) -> Self {
        match (&self.origin, origin) {
            (None, Some(origin)) => Self::with_origin(origin, self.name.clone()),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{}{}{}", origin, ORIGIN_SEPARATOR, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for SpecId {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&str> for SpecId {
    /// Infallible conversion for literals.
    ///
    /// Input [`SpecId::parse`] rejects, such as `"a#b#c"`, becomes an
    /// unqualified spec named by the whole string. Such an id matches no
    /// loadable spec and fails [`SpecId::validate`]; builders that return a
    /// result validate the ids they are given.
    fn from(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|_| Self::new(name))
    }
}

impl Serialize for SpecId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpecId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

/// Identity of a resolved feature: its spec plus the values of the spec's ID
/// parameters, kept in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureId {
    spec: SpecId,
    params: IndexMap<String, String>,
}

impl FeatureId {
    /// Create a feature id; `params` must not be empty
    pub fn new(spec: SpecId, params: IndexMap<String, String>) -> KeelResult<Self> {
        if params.is_empty() {
            return Err(KeelError::InvalidFeatureId {
                spec: spec.to_string(),
                reason: "a feature id needs at least one parameter".to_string(),
            });
        }
        Ok(Self { spec, params })
    }

    /// Create a feature id with a single ID parameter
    pub fn single(
        spec: impl Into<SpecId>,
        param: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut params = IndexMap::with_capacity(1);
        params.insert(param.into(), value.into());
        Self {
            spec: spec.into(),
            params,
        }
    }

    /// Start building a feature id for `spec`
    pub fn builder(spec: impl Into<SpecId>) -> FeatureIdBuilder {
        FeatureIdBuilder {
            spec: spec.into(),
            params: IndexMap::new(),
        }
    }

    /// Spec this feature instantiates
    pub fn spec(&self) -> &SpecId {
        &self.spec
    }

    /// ID parameter values in declaration order
    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    /// Value of a single ID parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Same id with the spec qualified by `origin` when it has none
    pub fn qualify(&self, origin: Option<&str>) -> Self {
        Self {
            spec: self.spec.qualify(origin),
            params: self.params.clone(),
        }
    }
}

impl Hash for FeatureId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.spec.hash(state);
        // Equality ignores insertion order, so hashing must too
        let mut entries: Vec<(&String, &String)> = self.params.iter().collect();
        entries.sort();
        entries.hash(state);
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for ch in text.chars() {
        if matches!(ch, ESCAPE | ':' | ',' | '=') {
            f.write_char(ESCAPE)?;
        }
        f.write_char(ch)?;
    }
    Ok(())
}

/// Split on unescaped `:`, `,` and `=`, keeping the separator that ended
/// each token
fn tokenize(input: &str) -> Option<Vec<(String, Option<char>)>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE => current.push(chars.next()?),
            ':' | ',' | '=' => tokens.push((std::mem::take(&mut current), Some(ch))),
            _ => current.push(ch),
        }
    }
    tokens.push((current, None));
    Some(tokens)
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.spec.to_string())?;
        f.write_char(':')?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write_escaped(f, name)?;
            f.write_char('=')?;
            write_escaped(f, value)?;
        }
        Ok(())
    }
}

impl FromStr for FeatureId {
    type Err = KeelError;

    /// Parse `spec:k1=v1,k2=v2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| KeelError::InvalidFeatureId {
            spec: s.to_string(),
            reason,
        };

        let mut tokens = tokenize(s)
            .ok_or_else(|| invalid("dangling escape character".to_string()))?
            .into_iter();
        let spec = match tokens.next() {
            Some((spec, Some(':'))) => SpecId::parse(&spec)?,
            _ => return Err(invalid("expected 'spec:param=value'".to_string())),
        };

        let mut params = IndexMap::new();
        while let Some((name, separator)) = tokens.next() {
            if separator != Some('=') {
                return Err(invalid(format!("parameter '{}' has no value", name)));
            }
            match tokens.next() {
                Some((value, None | Some(','))) => {
                    params.insert(name, value);
                },
                _ => return Err(invalid(format!("malformed value of parameter '{}'", name))),
            }
        }
        Self::new(spec, params)
    }
}

impl Serialize for FeatureId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeatureId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Incremental construction of a [`FeatureId`]
#[derive(Debug, Clone)]
pub struct FeatureIdBuilder {
    spec: SpecId,
    params: IndexMap<String, String>,
}

impl FeatureIdBuilder {
    /// Set an ID parameter value
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Finish the id, failing when no parameter was given
    pub fn build(self) -> KeelResult<FeatureId> {
        FeatureId::new(self.spec, self.params)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(id: &FeatureId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    proptest! {
        #[test]
        fn feature_id_hash_is_order_independent(
            params in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{1,6}", 1..6)
        ) {
            let forward: IndexMap<String, String> = params.clone().into_iter().collect();
            let backward: IndexMap<String, String> = params.into_iter().rev().collect();

            let a = FeatureId::new(SpecId::new("spec"), forward).unwrap();
            let b = FeatureId::new(SpecId::new("spec"), backward).unwrap();

            prop_assert_eq!(&a, &b);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }

        #[test]
        fn feature_id_display_round_trips(
            params in prop::collection::btree_map("\\PC{0,6}", "\\PC{0,8}", 1..4)
        ) {
            let id = FeatureId::new(SpecId::with_origin("core", "spec"), params.into_iter().collect()).unwrap();
            let parsed: FeatureId = id.to_string().parse().unwrap();
            prop_assert_eq!(&parsed, &id);

            let json = serde_json::to_string(&id).unwrap();
            let back: FeatureId = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, id);
        }
    }
}
