use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::redaction::redact_secrets;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `ShipwrightError` is what library operations return once an error leaves the
/// crate that produced it. It provides:
/// - Detailed error information for programmatic handling
/// - User-friendly messages with context and suggestions
/// - Mapping to CLI exit codes for consistent error reporting
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Invalid input, configuration errors |
/// | 3 | Requirements source unavailable |
/// | 4 | Budget exceeded or pipeline halted |
/// | 9 | Another run is already in progress |
/// | 10 | Timeout (only when a caller escalates it) |
/// | 70 | Generation failed with every provider |
/// | 1 | Other errors |
///
/// Library code returns `ShipwrightError` and does NOT call `std::process::exit()`.
#[derive(Error, Debug)]
pub enum ShipwrightError {
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error at {path}: {reason}")]
    Storage { path: String, reason: String },
}

/// Stable labels for the pipeline error taxonomy.
///
/// These are persisted in `WorkflowState.details` and printed on failure, so the
/// textual form is part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    SourceUnavailable,
    GenerationFailed,
    BudgetExceeded,
    AlreadyRunning,
    Timeout,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::SourceUnavailable => "SourceUnavailable",
            Self::GenerationFailed => "GenerationFailed",
            Self::BudgetExceeded => "BudgetExceeded",
            Self::AlreadyRunning => "AlreadyRunning",
            Self::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the pipeline itself, as opposed to failures of the plumbing below it.
///
/// Only the workflow engine turns one of these into a `failed` run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Bad operator input; fatal and never retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream requirements could not be fetched
    #[error("Requirements source unavailable: {0}")]
    SourceUnavailable(String),

    /// Every generation provider was exhausted without usable output
    #[error("Generation failed at stage {stage}: {reason}")]
    GenerationFailed { stage: u8, reason: String },

    /// The budget guard refused the transition or a halt was observed
    #[error("Budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

    /// A persisted run is still in progress or another process holds the run lock
    #[error("A pipeline run is already in progress: {0}")]
    AlreadyRunning(String),

    /// A polling bound was reached
    #[error("Timed out after {duration:?} waiting for {what}")]
    Timeout { what: String, duration: Duration },
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::InvalidInput => ExitCode::INVALID_INPUT,
            ErrorKind::SourceUnavailable => ExitCode::SOURCE_UNAVAILABLE,
            ErrorKind::GenerationFailed => ExitCode::GENERATION_FAILED,
            ErrorKind::BudgetExceeded => ExitCode::BUDGET_EXCEEDED,
            ErrorKind::AlreadyRunning => ExitCode::ALREADY_RUNNING,
            ErrorKind::Timeout => ExitCode::TIMEOUT,
        }
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    PipelineExecution,
    ProviderIntegration,
    ExternalService,
    FileSystem,
    Budget,
    Concurrency,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::PipelineExecution => write!(f, "Pipeline Execution"),
            Self::ProviderIntegration => write!(f, "Provider Integration"),
            Self::ExternalService => write!(f, "External Service"),
            Self::FileSystem => write!(f, "File System"),
            Self::Budget => write!(f, "Budget"),
            Self::Concurrency => write!(f, "Concurrency"),
        }
    }
}

impl UserFriendlyError for PipelineError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) => format!("Invalid input: {msg}"),
            Self::SourceUnavailable(msg) => {
                format!("Could not fetch the requirements: {msg}")
            }
            Self::GenerationFailed { stage, reason } => {
                format!("Stage {stage} could not produce output from any provider: {reason}")
            }
            Self::BudgetExceeded { reason } => {
                format!("The budget guard stopped the pipeline: {reason}")
            }
            Self::AlreadyRunning(msg) => format!("Another pipeline run is in progress: {msg}"),
            Self::Timeout { what, duration } => {
                format!("Gave up waiting for {what} after {duration:?}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidInput(_) => None,
            Self::SourceUnavailable(_) => Some(
                "Stage 1 needs either a reachable issue or inline requirements text.".to_string(),
            ),
            Self::GenerationFailed { .. } => Some(
                "Both the primary and the secondary provider failed or returned unusable output."
                    .to_string(),
            ),
            Self::BudgetExceeded { .. } => Some(
                "The halt flag is sticky and survives restarts and day boundaries.".to_string(),
            ),
            Self::AlreadyRunning(_) => Some(
                "Only one pipeline run may own the persisted workflow state at a time.".to_string(),
            ),
            Self::Timeout { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidInput(_) => vec![
                "Run 'shipwright start --issue <ID>' or 'shipwright start --spec <TEXT>'"
                    .to_string(),
                "See 'shipwright --help' for usage".to_string(),
            ],
            Self::SourceUnavailable(_) => vec![
                "Check the issue number and the GitHub token".to_string(),
                "Pass the requirements inline with --spec".to_string(),
                "Retry with 'shipwright resume'".to_string(),
            ],
            Self::GenerationFailed { .. } => vec![
                "Check provider credentials and connectivity".to_string(),
                "Retry the stage with 'shipwright resume'".to_string(),
            ],
            Self::BudgetExceeded { .. } => vec![
                "Inspect spend with 'shipwright budget report'".to_string(),
                "Lift the halt with 'shipwright budget clear --operator <NAME>'".to_string(),
            ],
            Self::AlreadyRunning(_) => vec![
                "Continue the existing run with 'shipwright resume'".to_string(),
                "Discard it with 'shipwright start --reset' or 'shipwright reset'".to_string(),
            ],
            Self::Timeout { .. } => vec!["Increase the timeout in .shipwright/config.toml".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::Configuration,
            Self::SourceUnavailable(_) => ErrorCategory::ExternalService,
            Self::GenerationFailed { .. } => ErrorCategory::ProviderIntegration,
            Self::BudgetExceeded { .. } => ErrorCategory::Budget,
            Self::AlreadyRunning(_) => ErrorCategory::Concurrency,
            Self::Timeout { .. } => ErrorCategory::PipelineExecution,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
            Self::ValidationFailed { errors, .. } => {
                format!(
                    "Configuration validation failed with {} errors: {}",
                    errors.len(),
                    errors.join(", ")
                )
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => Some(
                "shipwright searches for .shipwright/config.toml starting from the current directory upward."
                    .to_string(),
            ),
            Self::InvalidFile(_) => {
                Some("Configuration files must be valid TOML.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) | Self::ValidationFailed { .. } => vec![
                "Check the TOML syntax of .shipwright/config.toml".to_string(),
                "Remove the offending key to fall back to the default".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Create .shipwright/config.toml in your project root".to_string(),
                "Omit --config to use built-in defaults".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors that can occur during LLM backend operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, unreadable body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider answered successfully but with nothing in it
    #[error("Empty response from {0}")]
    EmptyResponse(String),

    /// Per-run call cap reached
    #[error("Call cap reached: attempted {attempted} calls, limit is {limit}")]
    CallCapExceeded { limit: u32, attempted: u32 },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::EmptyResponse(provider) => format!("{provider} returned an empty response"),
            Self::CallCapExceeded { limit, attempted } => {
                format!("LLM call cap reached: attempted {attempted} calls, limit is {limit}")
            }
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::CallCapExceeded { .. } => Some(
                "The per-run call cap bounds how many provider calls one pipeline run may make."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable named in [llm.primary] is set"
                    .to_string(),
            ],
            Self::Transport(_) | Self::ProviderOutage(_) | Self::Timeout { .. } => vec![
                "Check network connectivity and whether the local provider is running".to_string(),
                "Run with --verbose to see each provider attempt".to_string(),
            ],
            Self::ProviderQuota(_) => vec!["Wait a few minutes and try again".to_string()],
            Self::EmptyResponse(_) => vec!["Try the other provider with --prefer-secondary".to_string()],
            Self::CallCapExceeded { .. } => {
                vec!["Raise llm.max_calls_per_run in .shipwright/config.toml".to_string()]
            }
            Self::Misconfiguration(_) => {
                vec!["Review the [llm] section of .shipwright/config.toml".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => ErrorCategory::Configuration,
            Self::CallCapExceeded { .. } | Self::ProviderQuota(_) => ErrorCategory::Budget,
            _ => ErrorCategory::ProviderIntegration,
        }
    }
}

/// Errors raised by collaborator adapters (issue tracker, pull requests, previews, checks)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Not configured: {0}")]
    Unconfigured(String),

    #[error("Command failed: {0}")]
    Command(String),
}

impl UserFriendlyError for AdapterError {
    fn user_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("Remote resource not found: {what}"),
            Self::Unauthorized(what) => format!("Remote service refused credentials: {what}"),
            Self::Transport(msg) => format!("Could not reach remote service: {msg}"),
            Self::Rejected { status, message } => {
                format!("Remote service rejected the request ({status}): {message}")
            }
            Self::Unconfigured(what) => format!("{what} is not configured"),
            Self::Command(msg) => format!("External command failed: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        None
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Unauthorized(_) => {
                vec!["Check the token environment variable named in [github]".to_string()]
            }
            Self::Unconfigured(_) => {
                vec!["Add the missing section to .shipwright/config.toml".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unconfigured(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::ExternalService,
        }
    }
}

/// Run lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Run lock held by process {pid} (acquired {age_secs}s ago)")]
    Held { pid: u32, age_secs: u64 },

    #[error("Run lock file {path} is corrupted: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Run lock IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl UserFriendlyError for LockError {
    fn user_message(&self) -> String {
        match self {
            Self::Held { pid, .. } => format!("Another shipwright process ({pid}) is running"),
            Self::Corrupted { path, .. } => format!("Run lock {path} could not be read"),
            Self::Io { path, source } => format!("Could not access run lock {path}: {source}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some("The run lock keeps two processes from driving the same pipeline state.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Held { .. } => vec!["Wait for the other run to finish".to_string()],
            Self::Corrupted { path, .. } => vec![format!("Delete {path} if no run is active")],
            Self::Io { .. } => vec!["Check permissions on the shipwright home".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Concurrency
    }
}

impl UserFriendlyError for ShipwrightError {
    fn user_message(&self) -> String {
        match self {
            Self::Pipeline(e) => e.user_message(),
            Self::Config(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Adapter(e) => e.user_message(),
            Self::Lock(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
            Self::Storage { path, reason } => format!("Could not persist {path}: {reason}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Pipeline(e) => e.context(),
            Self::Config(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Adapter(e) => e.context(),
            Self::Lock(e) => e.context(),
            Self::Io(_) | Self::Storage { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Pipeline(e) => e.suggestions(),
            Self::Config(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Adapter(e) => e.suggestions(),
            Self::Lock(e) => e.suggestions(),
            Self::Io(_) | Self::Storage { .. } => {
                vec!["Check that the shipwright home directory is writable".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Pipeline(e) => e.category(),
            Self::Config(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Adapter(e) => e.category(),
            Self::Lock(e) => e.category(),
            Self::Io(_) | Self::Storage { .. } => ErrorCategory::FileSystem,
        }
    }
}

impl ShipwrightError {
    /// Build a storage error from any displayable cause.
    pub fn storage(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Storage {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The pipeline taxonomy label, if this error belongs to it.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Pipeline(e) => Some(e.kind()),
            Self::Lock(LockError::Held { .. }) => Some(ErrorKind::AlreadyRunning),
            Self::Config(_) => Some(ErrorKind::InvalidInput),
            _ => None,
        }
    }

    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    ///
    /// The result is passed through secret redaction before it is returned.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        redact_secrets(&output)
    }

    /// Map this error to the appropriate CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Pipeline(e) => e.to_exit_code(),
            Self::Config(_) => ExitCode::INVALID_INPUT,
            Self::Lock(LockError::Held { .. }) => ExitCode::ALREADY_RUNNING,
            Self::Llm(LlmError::Misconfiguration(_)) => ExitCode::INVALID_INPUT,
            Self::Llm(_) => ExitCode::GENERATION_FAILED,
            Self::Adapter(AdapterError::Unconfigured(_)) => ExitCode::INVALID_INPUT,
            _ => ExitCode::INTERNAL,
        }
    }
}
