//! Subcommands and the shared engine context they run against.

pub mod check;
pub mod grant;
pub mod group;
pub mod list;
pub mod report;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use warden_core::adapter::FileAdapter;
use warden_core::config::Config;
use warden_core::policy::{Action, Enforcer};

use crate::output::OutputFormat;

/// Everything a subcommand needs.
pub struct Context {
    pub enforcer: Enforcer,
    pub config: Config,
    pub format: OutputFormat,
    pub policy_path: PathBuf,
}

impl Context {
    /// Open the policy file chosen by flag, configuration, or default location.
    pub fn open(policy: Option<PathBuf>, config: Config, format: OutputFormat) -> Result<Self> {
        let policy_path = resolve_policy_path(policy, &config)?;
        let adapter = Arc::new(FileAdapter::new(&policy_path));
        let enforcer = Enforcer::new(adapter, config.enforcer_options())
            .with_context(|| format!("Failed to load policy from {}", policy_path.display()))?;

        tracing::debug!(path = %policy_path.display(), "Policy opened");
        Ok(Self {
            enforcer,
            config,
            format,
            policy_path,
        })
    }

    /// The explicit action, or the configured default.
    pub fn action(&self, action: Option<String>) -> Action {
        action
            .map(Action::new)
            .unwrap_or_else(|| self.config.policy.action())
    }

    pub fn policy_path(&self) -> &Path {
        &self.policy_path
    }
}

/// `--policy`, then `policy.path` (file or `WARDEN__POLICY__PATH`), then
/// `~/.warden/policy.csv`.
fn resolve_policy_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    if let Some(path) = flag.or_else(|| config.policy.path.clone()) {
        return Ok(path);
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".warden").join("policy.csv"))
}
