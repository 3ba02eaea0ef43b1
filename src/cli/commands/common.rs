//! Production wiring shared by the commands.

use std::sync::Arc;
use tracing::{debug, warn};

use shipwright_adapters::{
    CommandVisualChecks, GitHubClient, IssueSource, LedgerUsageSource, PreviewAdapter,
    PullRequestAdapter, UnconfiguredGitHub,
};
use shipwright_budget::{
    BudgetGuard, FileBudgetStore, LogNotifier, Notifier, UsageLedger, WebhookNotifier,
};
use shipwright_config::Config;
use shipwright_engine::{Collaborators, EngineSettings, FileStateStore, WorkflowEngine};
use shipwright_llm::build_provider_client;
use shipwright_utils::error::AdapterError;
use shipwright_utils::paths;

/// The budget guard over the on-disk ledger.
pub fn build_guard(config: &Config) -> Arc<BudgetGuard> {
    let notifier: Arc<dyn Notifier> = match config
        .budget
        .notify_webhook_env
        .as_deref()
        .and_then(WebhookNotifier::from_env)
    {
        Some(webhook) => Arc::new(webhook),
        None => Arc::new(LogNotifier),
    };
    Arc::new(BudgetGuard::from_config(
        &config.budget,
        Arc::new(FileBudgetStore::at_home()),
        notifier,
    ))
}

struct GitHubSide {
    issues: Arc<dyn IssueSource>,
    pulls: Arc<dyn PullRequestAdapter>,
    preview: Arc<dyn PreviewAdapter>,
}

fn github(config: &Config) -> GitHubSide {
    match GitHubClient::from_config(&config.github) {
        Ok(client) => {
            debug!(repo = %client.repo(), "GitHub client configured");
            let client = Arc::new(client);
            GitHubSide {
                issues: client.clone(),
                pulls: client.clone(),
                preview: client,
            }
        }
        Err(err) => {
            if !matches!(err, AdapterError::Unconfigured(_)) {
                warn!(error = %err, "GitHub client unavailable");
            }
            let missing = match err {
                AdapterError::Unconfigured(what) => what,
                other => other.to_string(),
            };
            let stand_in = Arc::new(UnconfiguredGitHub::new(missing));
            GitHubSide {
                issues: stand_in.clone(),
                pulls: stand_in.clone(),
                preview: stand_in,
            }
        }
    }
}

/// The engine with real collaborators, persisting under the shipwright home.
pub fn build_engine(config: &Config) -> WorkflowEngine {
    let guard = build_guard(config);
    let ledger: Arc<dyn UsageLedger> = guard.clone();
    let provider = build_provider_client(&config.llm, Some(ledger));
    let gh = github(config);

    let collaborators = Collaborators {
        issues: gh.issues,
        pulls: gh.pulls,
        preview: gh.preview,
        visual: Arc::new(CommandVisualChecks::from_config(&config.visual)),
        usage: Arc::new(LedgerUsageSource::new(guard.clone())),
    };

    WorkflowEngine::new(
        Arc::new(FileStateStore::at_home()),
        guard,
        Arc::new(provider),
        collaborators,
        EngineSettings::from_config(config),
    )
    .with_lock(paths::run_lock_path())
}
