use async_trait::async_trait;

use shipwright_utils::error::AdapterError;

use crate::contracts::{
    ArtifactFile, CheckStatus, IssueSource, PreviewAdapter, PreviewStatus, PullRequest,
    PullRequestAdapter, PullRequestRequest,
};

/// Stand-in for a GitHub client that could not be constructed.
///
/// Every call fails with `AdapterError::Unconfigured`, so a run that only
/// needs inline requirements still gets as far as stage 3 before the missing
/// repository settings are reported.
#[derive(Debug, Clone)]
pub struct UnconfiguredGitHub {
    missing: String,
}

impl UnconfiguredGitHub {
    #[must_use]
    pub fn new(missing: impl Into<String>) -> Self {
        Self {
            missing: missing.into(),
        }
    }

    fn err(&self) -> AdapterError {
        AdapterError::Unconfigured(self.missing.clone())
    }
}

#[async_trait]
impl IssueSource for UnconfiguredGitHub {
    async fn fetch(&self, _issue_id: &str) -> Result<String, AdapterError> {
        Err(self.err())
    }
}

#[async_trait]
impl PullRequestAdapter for UnconfiguredGitHub {
    async fn create_branch(&self, _name: &str, _base: &str) -> Result<(), AdapterError> {
        Err(self.err())
    }

    async fn push_files(
        &self,
        _branch: &str,
        _files: &[ArtifactFile],
        _message: &str,
    ) -> Result<(), AdapterError> {
        Err(self.err())
    }

    async fn open_pull_request(
        &self,
        _request: &PullRequestRequest,
    ) -> Result<PullRequest, AdapterError> {
        Err(self.err())
    }

    async fn poll_checks(&self, _pr_number: u64) -> Result<CheckStatus, AdapterError> {
        Err(self.err())
    }
}

#[async_trait]
impl PreviewAdapter for UnconfiguredGitHub {
    async fn resolve_preview_url(&self, _pr_number: u64) -> Result<PreviewStatus, AdapterError> {
        Err(self.err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_reports_the_missing_setting() {
        let gh = UnconfiguredGitHub::new("github.repo");

        let err = gh.fetch("42").await.unwrap_err();
        assert!(matches!(err, AdapterError::Unconfigured(ref m) if m == "github.repo"));
        assert!(gh.create_branch("b", "main").await.is_err());
        assert!(gh.poll_checks(1).await.is_err());
        assert!(gh.resolve_preview_url(1).await.is_err());
    }
}
