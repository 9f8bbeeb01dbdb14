//! Feature-pack coordinates.
//!
//! A coordinate names a feature pack as `group:artifact[:version]`. The
//! resolver never resolves coordinates to artifacts; it only compares them.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KeelError, KeelResult};

/// Coordinate of a feature pack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeaturePackCoord {
    pub group: String,
    pub artifact: String,
    pub version: Option<String>,
}

impl FeaturePackCoord {
    /// Create a version-qualified coordinate
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: Some(version.into()),
        }
    }

    /// Create a coordinate without a version
    pub fn unversioned(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: None,
        }
    }

    /// Parse `group:artifact` or `group:artifact:version`
    pub fn parse(input: &str) -> KeelResult<Self> {
        let invalid = |reason: &str| KeelError::InvalidCoordinate {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = input.trim().split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty component"));
        }
        match parts.as_slice() {
            [group, artifact] => Ok(Self::unversioned(*group, *artifact)),
            [group, artifact, version] => Ok(Self::new(*group, *artifact, *version)),
            _ => Err(invalid("expected group:artifact[:version]")),
        }
    }

    /// The same feature pack regardless of version
    pub fn without_version(&self) -> Self {
        Self::unversioned(self.group.clone(), self.artifact.clone())
    }

    /// Whether two coordinates name the same feature pack, ignoring version
    pub fn same_pack(&self, other: &Self) -> bool {
        self.group == other.group && self.artifact == other.artifact
    }
}

impl fmt::Display for FeaturePackCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)?;
        if let Some(ref version) = self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for FeaturePackCoord {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FeaturePackCoord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeaturePackCoord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        let versioned = FeaturePackCoord::parse("org.acme:core-pack:1.0.0").unwrap();
        assert_eq!(versioned.version.as_deref(), Some("1.0.0"));
        assert_eq!(versioned.to_string(), "org.acme:core-pack:1.0.0");

        let bare = FeaturePackCoord::parse("org.acme:core-pack").unwrap();
        assert_eq!(bare.version, None);
        assert_eq!(versioned.without_version(), bare);
    }

    #[test]
    fn test_parse_invalid_coordinates() {
        assert!(FeaturePackCoord::parse("core-pack").is_err());
        assert!(FeaturePackCoord::parse("org::1.0").is_err());
        assert!(FeaturePackCoord::parse("a:b:c:d").is_err());
    }

    #[test]
    fn test_same_pack_ignores_version() {
        let a = FeaturePackCoord::new("org", "pack", "1.0");
        let b = FeaturePackCoord::new("org", "pack", "2.0");
        assert!(a.same_pack(&b));
        assert_ne!(a, b);
    }
}
