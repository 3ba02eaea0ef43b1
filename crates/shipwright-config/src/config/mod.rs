//! Configuration model with discovery and precedence.
//!
//! Precedence: CLI arguments > `.shipwright/config.toml` > built-in defaults.

mod discovery;
mod model;
mod validation;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub use model::{
    BudgetConfig, Defaults, GithubConfig, LlmConfig, PipelineConfig, PrimaryProviderConfig,
    SecondaryProviderConfig, VisualConfig,
};

/// Where an effective configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::ConfigFile(path) => write!(f, "config file {}", path.display()),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

/// CLI values that participate in configuration precedence
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file; disables upward discovery
    pub config_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub prefer_secondary: Option<bool>,
}

/// Effective configuration for one shipwright invocation.
///
/// Build with [`Config::discover`] for CLI behavior, or [`Config::default`]
/// for a fully deterministic configuration independent of the filesystem.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub defaults: Defaults,
    pub llm: LlmConfig,
    pub budget: BudgetConfig,
    pub pipeline: PipelineConfig,
    pub github: GithubConfig,
    pub visual: VisualConfig,
    /// Config file that was loaded, if any
    pub config_path: Option<PathBuf>,
    /// Dotted key → source of the effective value
    pub source_attribution: BTreeMap<String, ConfigSource>,
}

impl Config {
    /// Source of a dotted key such as `budget.daily_cap_usd`.
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Defaults)
    }

    /// Configuration with defaults only; no discovery, no validation surprises.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self::default()
    }
}
