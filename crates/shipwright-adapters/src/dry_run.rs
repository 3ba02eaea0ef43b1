//! Deterministic stand-ins for every collaborator.
//!
//! Each stub describes the effect it replaced in a shared [`EffectLog`] and
//! returns a fixed value, so a dry run walks the whole pipeline without
//! touching the network.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use shipwright_utils::error::AdapterError;

use crate::contracts::{
    ArtifactFile, CheckStatus, IssueSource, PreviewAdapter, PreviewStatus, PullRequest,
    PullRequestAdapter, PullRequestRequest, VisualCheckAdapter, VisualOutcome,
};

pub const DRY_RUN_PR_NUMBER: u64 = 0;
pub const DRY_RUN_PR_URL: &str = "https://dry-run.invalid/pull/0";
pub const DRY_RUN_PREVIEW_URL: &str = "https://dry-run.invalid/preview";

/// Ordered descriptions of the effects a dry run skipped
#[derive(Debug, Clone, Default)]
pub struct EffectLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EffectLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, description: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(description.into());
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct DryRunIssueSource {
    log: EffectLog,
}

impl DryRunIssueSource {
    #[must_use]
    pub fn new(log: EffectLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl IssueSource for DryRunIssueSource {
    async fn fetch(&self, issue_id: &str) -> Result<String, AdapterError> {
        self.log.record(format!("would fetch issue {issue_id}"));
        Ok(format!("# Issue {issue_id}\n\nDry-run placeholder requirements."))
    }
}

#[derive(Debug, Clone)]
pub struct DryRunPullRequests {
    log: EffectLog,
}

impl DryRunPullRequests {
    #[must_use]
    pub fn new(log: EffectLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PullRequestAdapter for DryRunPullRequests {
    async fn create_branch(&self, name: &str, base: &str) -> Result<(), AdapterError> {
        self.log
            .record(format!("would create branch {name} from {base}"));
        Ok(())
    }

    async fn push_files(
        &self,
        branch: &str,
        files: &[ArtifactFile],
        _message: &str,
    ) -> Result<(), AdapterError> {
        self.log
            .record(format!("would push {} file(s) to {branch}", files.len()));
        Ok(())
    }

    async fn open_pull_request(
        &self,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, AdapterError> {
        self.log.record(format!(
            "would open {}pull request '{}' ({} -> {})",
            if request.draft { "draft " } else { "" },
            request.title,
            request.head,
            request.base
        ));
        Ok(PullRequest {
            number: DRY_RUN_PR_NUMBER,
            url: DRY_RUN_PR_URL.to_string(),
        })
    }

    async fn poll_checks(&self, pr_number: u64) -> Result<CheckStatus, AdapterError> {
        self.log
            .record(format!("would poll CI checks for pull request #{pr_number}"));
        Ok(CheckStatus::Success)
    }
}

#[derive(Debug, Clone)]
pub struct DryRunPreview {
    log: EffectLog,
}

impl DryRunPreview {
    #[must_use]
    pub fn new(log: EffectLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PreviewAdapter for DryRunPreview {
    async fn resolve_preview_url(&self, pr_number: u64) -> Result<PreviewStatus, AdapterError> {
        self.log.record(format!(
            "would resolve the preview deployment for pull request #{pr_number}"
        ));
        Ok(PreviewStatus::Url(DRY_RUN_PREVIEW_URL.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct DryRunVisualChecks {
    log: EffectLog,
}

impl DryRunVisualChecks {
    #[must_use]
    pub fn new(log: EffectLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl VisualCheckAdapter for DryRunVisualChecks {
    async fn run_checks(&self) -> Result<VisualOutcome, AdapterError> {
        self.log.record("would run the visual/performance suite");
        Ok(VisualOutcome::Skipped {
            reason: "dry run".to_string(),
        })
    }
}
