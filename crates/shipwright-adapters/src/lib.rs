//! External collaborators of the pipeline: issue tracker, pull requests, CI,
//! preview deployments, visual/perf checks, and usage reporting.

pub mod contracts;
pub mod dry_run;
pub mod github;
pub mod unconfigured;
pub mod usage;
pub mod visual;

pub use contracts::{
    ArtifactFile, CheckStatus, IssueSource, PreviewAdapter, PreviewStatus, ProviderUsage,
    PullRequest, PullRequestAdapter, PullRequestRequest, UsageSource, VisualCheckAdapter,
    VisualOutcome,
};
pub use dry_run::{
    DryRunIssueSource, DryRunPreview, DryRunPullRequests, DryRunVisualChecks, EffectLog,
};
pub use github::GitHubClient;
pub use unconfigured::UnconfiguredGitHub;
pub use usage::LedgerUsageSource;
pub use visual::CommandVisualChecks;
pub use shipwright_utils::error::AdapterError;
