use serde::{Deserialize, Serialize};
use std::time::Duration;

/// General defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    pub verbose: bool,
    /// Branch pull requests are opened against
    pub base_branch: String,
    /// Prefix for generated branch names
    pub branch_prefix: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            verbose: false,
            base_branch: "main".to_string(),
            branch_prefix: "shipwright/".to_string(),
        }
    }
}

/// Primary provider: Anthropic Messages API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryProviderConfig {
    pub api_key_env: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

impl Default for PrimaryProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            temperature: 0.2,
            input_usd_per_mtok: 3.0,
            output_usd_per_mtok: 15.0,
        }
    }
}

/// Secondary provider: a local Ollama server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryProviderConfig {
    pub base_url: String,
    pub model: String,
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

impl Default for SecondaryProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/api/generate".to_string(),
            model: "codellama".to_string(),
            input_usd_per_mtok: 0.0,
            output_usd_per_mtok: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Try the secondary provider before the primary one
    pub prefer_secondary: bool,
    pub timeout_secs: u64,
    pub max_calls_per_run: u32,
    pub primary: PrimaryProviderConfig,
    pub secondary: SecondaryProviderConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            prefer_secondary: false,
            timeout_secs: 60,
            max_calls_per_run: 20,
            primary: PrimaryProviderConfig::default(),
            secondary: SecondaryProviderConfig::default(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub daily_cap_usd: f64,
    /// Fraction of the cap at which a warning is emitted
    pub warn_ratio: f64,
    pub browser_minute_usd: f64,
    pub snapshot_usd: f64,
    /// Env var holding a Slack-compatible incoming webhook URL
    pub notify_webhook_env: Option<String>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_cap_usd: 5.0,
            warn_ratio: 0.8,
            browser_minute_usd: 0.008,
            snapshot_usd: 0.01,
            notify_webhook_env: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub ci_timeout_secs: u64,
    pub ci_poll_interval_secs: u64,
    pub preview_timeout_secs: u64,
    pub preview_poll_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ci_timeout_secs: 15 * 60,
            ci_poll_interval_secs: 30,
            preview_timeout_secs: 10 * 60,
            preview_poll_interval_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    /// `owner/name`; unset means no GitHub-backed adapters
    pub repo: Option<String>,
    pub token_env: String,
    pub api_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo: None,
            token_env: "GITHUB_TOKEN".to_string(),
            api_base: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualConfig {
    /// Command line for the visual/perf suite
    pub command: Option<String>,
    /// When set and missing from the environment, the stage is skipped
    pub token_env: Option<String>,
}

// ---------------------------------------------------------------------------
// On-disk shape: every key optional so attribution knows what the file set.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub defaults: Option<TomlDefaults>,
    pub llm: Option<TomlLlm>,
    pub budget: Option<TomlBudget>,
    pub pipeline: Option<TomlPipeline>,
    pub github: Option<TomlGithub>,
    pub visual: Option<TomlVisual>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlDefaults {
    pub verbose: Option<bool>,
    pub base_branch: Option<String>,
    pub branch_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlLlm {
    pub prefer_secondary: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub max_calls_per_run: Option<u32>,
    pub primary: Option<TomlPrimary>,
    pub secondary: Option<TomlSecondary>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlPrimary {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub input_usd_per_mtok: Option<f64>,
    pub output_usd_per_mtok: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlSecondary {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub input_usd_per_mtok: Option<f64>,
    pub output_usd_per_mtok: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlBudget {
    pub daily_cap_usd: Option<f64>,
    pub warn_ratio: Option<f64>,
    pub browser_minute_usd: Option<f64>,
    pub snapshot_usd: Option<f64>,
    pub notify_webhook_env: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlPipeline {
    pub ci_timeout_secs: Option<u64>,
    pub ci_poll_interval_secs: Option<u64>,
    pub preview_timeout_secs: Option<u64>,
    pub preview_poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlGithub {
    pub repo: Option<String>,
    pub token_env: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlVisual {
    pub command: Option<String>,
    pub token_env: Option<String>,
}
