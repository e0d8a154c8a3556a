//! Configuration management.
//!
//! Values come from an optional config file overlaid with `WARDEN__*`
//! environment variables, e.g. `WARDEN__ENFORCER__CACHE_CLOSURES=false`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::policy::enforcer::EnforcerOptions;
use crate::policy::model::Action;
use crate::policy::report::{LeafRule, RootFilter};
use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "WARDEN";
const ENV_SEPARATOR: &str = "__";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Where the policy lives
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Enforcement engine behaviour
    #[serde(default)]
    pub enforcer: EnforcerConfig,

    /// How hierarchy reports classify nodes
    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Policy file; `None` lets the consumer pick its default location
    pub path: Option<PathBuf>,

    /// Action checked when a caller does not name one
    #[serde(default = "default_action")]
    pub default_action: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_action: default_action(),
        }
    }
}

impl PolicyConfig {
    pub fn action(&self) -> Action {
        Action::new(self.default_action.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnforcerConfig {
    /// Memoize ancestor closures between mutations
    #[serde(default = "default_true")]
    pub cache_closures: bool,

    /// Log principal fingerprints instead of raw identifiers
    #[serde(default = "default_true")]
    pub redact_principals: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            cache_closures: true,
            redact_principals: true,
        }
    }
}

impl From<&EnforcerConfig> for EnforcerOptions {
    fn from(config: &EnforcerConfig) -> Self {
        Self {
            cache_closures: config.cache_closures,
            redact_principals: config.redact_principals,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HierarchyConfig {
    /// Names starting with this are leaves; unset means "childless nodes are leaves"
    pub leaf_prefix: Option<String>,

    /// Keep only top-level nodes whose name contains this
    pub root_contains: Option<String>,
}

impl HierarchyConfig {
    pub fn leaf_rule(&self) -> LeafRule {
        match &self.leaf_prefix {
            Some(prefix) if !prefix.is_empty() => LeafRule::Prefix(prefix.clone()),
            _ => LeafRule::Childless,
        }
    }

    pub fn root_filter(&self) -> RootFilter {
        match &self.root_contains {
            Some(needle) if !needle.is_empty() => RootFilter::Contains(needle.clone()),
            _ => RootFilter::Any,
        }
    }
}

// Default value functions
fn default_action() -> String { "call".to_string() }
fn default_true() -> bool { true }

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::build(None, environment())
    }

    /// Load from a specific file path, with the environment on top.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::build(Some(path.as_ref()), environment())
    }

    fn build(file: Option<&Path>, env: config::Environment) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder.add_source(env).build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    pub fn enforcer_options(&self) -> EnforcerOptions {
        EnforcerOptions::from(&self.enforcer)
    }
}
