//! Resolver settings: file layer plus environment overrides

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use keel_core::error::KeelError;

use crate::ConfigResult;

/// Prefix of environment variables recognized as overrides
pub const ENV_PREFIX: &str = "KEEL_";

/// Knobs of the resolution engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    /// Deepest allowed nesting of feature groups
    pub max_group_depth: usize,

    /// Use an override body as the feature when no stored config exists
    pub allow_inline_feature_bodies: bool,

    /// Log each lined-up feature at debug instead of trace level
    pub trace_line_up: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_group_depth: 64,
            allow_inline_feature_bodies: true,
            trace_line_up: false,
        }
    }
}

impl ResolverSettings {
    /// Parse settings from TOML; missing keys keep their defaults
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(input).map_err(|e| KeelError::Settings {
            field: "toml".to_string(),
            reason: e.message().to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `KEEL_*` overrides; unknown keys are ignored
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "KEEL_MAX_GROUP_DEPTH" => {
                    self.max_group_depth = value.parse().map_err(|e| KeelError::Settings {
                        field: key.clone(),
                        reason: format!("Invalid depth '{}': {}", value, e),
                    })?;
                },
                "KEEL_ALLOW_INLINE_FEATURE_BODIES" => {
                    self.allow_inline_feature_bodies = parse_flag(key, value)?;
                },
                "KEEL_TRACE_LINE_UP" => {
                    self.trace_line_up = parse_flag(key, value)?;
                },
                _ => {},
            }
        }
        self.validate()
    }

    /// Collect `KEEL_*` variables from the process environment
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }

    /// Settings from an optional TOML layer with environment overrides on top
    pub fn layered(toml: Option<&str>, overrides: &HashMap<String, String>) -> ConfigResult<Self> {
        let mut settings = match toml {
            Some(input) => Self::from_toml_str(input)?,
            None => Self::default(),
        };
        settings.apply_overrides(overrides)?;
        Ok(settings)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_group_depth == 0 {
            return Err(KeelError::Settings {
                field: "max_group_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(KeelError::Settings {
            field: key.to_string(),
            reason: format!("Expected a boolean, got '{}'", other),
        }),
    }
}
