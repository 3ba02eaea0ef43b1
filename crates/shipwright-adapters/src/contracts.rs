//! Request/response contracts for the external services the pipeline drives.
//!
//! The engine only sees these traits; GitHub, the visual suite, and the
//! dry-run stubs are interchangeable behind them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shipwright_budget::Money;
use shipwright_utils::error::AdapterError;

/// One generated file destined for the pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub content: String,
}

impl ArtifactFile {
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

/// Aggregate CI state of a pull request head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "url")]
pub enum PreviewStatus {
    Url(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "result")]
pub enum VisualOutcome {
    /// Suite passed; metered usage is charged to the budget
    Passed { snapshots: u32, browser_minutes: f64 },
    Failed { reason: String },
    /// Not configured, so nothing ran
    Skipped { reason: String },
}

/// Daily usage reported by one billing provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub provider: String,
    pub tokens: u64,
    pub cost: Money,
}

#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Requirements text for an issue. `NotFound`/`Unauthorized` on failure.
    async fn fetch(&self, issue_id: &str) -> Result<String, AdapterError>;
}

#[async_trait]
pub trait PullRequestAdapter: Send + Sync {
    /// Create `name` from the head of `base`. An existing branch is success.
    async fn create_branch(&self, name: &str, base: &str) -> Result<(), AdapterError>;

    /// Commit `files` onto `branch` as one commit.
    async fn push_files(
        &self,
        branch: &str,
        files: &[ArtifactFile],
        message: &str,
    ) -> Result<(), AdapterError>;

    /// Open (or find the already open) pull request for `request.head`.
    async fn open_pull_request(
        &self,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, AdapterError>;

    async fn poll_checks(&self, pr_number: u64) -> Result<CheckStatus, AdapterError>;
}

#[async_trait]
pub trait PreviewAdapter: Send + Sync {
    async fn resolve_preview_url(&self, pr_number: u64) -> Result<PreviewStatus, AdapterError>;
}

#[async_trait]
pub trait VisualCheckAdapter: Send + Sync {
    async fn run_checks(&self) -> Result<VisualOutcome, AdapterError>;
}

#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn daily_usage(&self) -> Result<Vec<ProviderUsage>, AdapterError>;
}
