//! TOML-based configuration for the metric graph engine.
//!
//! String values support `${VAR}` / `$VAR` environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [store]
//! path = "${METRIC_GRAPH_DB}"
//!
//! [resolver]
//! cycle_policy = "fail"   # or "skip"
//! max_depth = 32          # 0 disables
//! max_metrics = 512       # 0 disables
//!
//! [introspector]
//! reserved_labels = ["Column", "Table", "Node", "Rel", "Order", "Group"]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub resolver: ResolverSettings,
    pub introspector: IntrospectorSettings,
}

/// Graph store location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path of the on-disk store (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl StoreSettings {
    /// The store path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

/// What the resolver does when a metric depends on itself, directly or
/// through other metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Abort the resolution with a dependency cycle error.
    #[default]
    Fail,
    /// Leave the back edge out and keep resolving.
    Skip,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub cycle_policy: CyclePolicy,

    /// Deepest dependency nesting allowed below a requested metric.
    pub max_depth: usize,

    /// Most metrics one resolution may expand.
    pub max_metrics: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            cycle_policy: CyclePolicy::Fail,
            max_depth: 32,
            max_metrics: 512,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntrospectorSettings {
    /// Labels that collide with catalog keywords and must be backtick-quoted.
    pub reserved_labels: Vec<String>,
}

impl Default for IntrospectorSettings {
    fn default() -> Self {
        Self {
            reserved_labels: default_reserved_labels(),
        }
    }
}

fn default_reserved_labels() -> Vec<String> {
    ["Column", "Table", "Node", "Rel", "Order", "Group"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(path) = &self.store.path {
            if path.trim().is_empty() {
                return Err(SettingsError::InvalidConfig(
                    "store.path must not be empty".to_string(),
                ));
            }
        }
        for label in &self.introspector.reserved_labels {
            if label.is_empty() || label.contains('`') {
                return Err(SettingsError::InvalidConfig(format!(
                    "introspector.reserved_labels entry {:?} is not a plain label",
                    label
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Runtime configuration handed to the components
// ============================================================================

/// Resolver limits. `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub cycle_policy: CyclePolicy,
    pub max_depth: Option<usize>,
    pub max_metrics: Option<usize>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig::from(&ResolverSettings::default())
    }
}

impl From<&ResolverSettings> for ResolverConfig {
    fn from(s: &ResolverSettings) -> Self {
        ResolverConfig {
            cycle_policy: s.cycle_policy,
            max_depth: (s.max_depth > 0).then_some(s.max_depth),
            max_metrics: (s.max_metrics > 0).then_some(s.max_metrics),
        }
    }
}

impl From<&Settings> for ResolverConfig {
    fn from(s: &Settings) -> Self {
        ResolverConfig::from(&s.resolver)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectorConfig {
    pub reserved_labels: Vec<String>,
}

impl Default for IntrospectorConfig {
    fn default() -> Self {
        IntrospectorConfig {
            reserved_labels: default_reserved_labels(),
        }
    }
}

impl From<&Settings> for IntrospectorConfig {
    fn from(s: &Settings) -> Self {
        IntrospectorConfig {
            reserved_labels: s.introspector.reserved_labels.clone(),
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }
            if !closed {
                return Err(SettingsError::InvalidConfig(format!(
                    "unterminated variable reference in {:?}",
                    s
                )));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // Lone $
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
