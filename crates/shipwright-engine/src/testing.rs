//! Scriptable collaborators and a ready-made engine for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shipwright_adapters::{
    AdapterError, ArtifactFile, CheckStatus, IssueSource, PreviewAdapter, PreviewStatus,
    ProviderUsage, PullRequest, PullRequestAdapter, PullRequestRequest, UsageSource,
    VisualCheckAdapter, VisualOutcome,
};
use shipwright_budget::{BudgetGuard, LogNotifier, MemoryBudgetStore, Money, TokenPrice};
use shipwright_llm::{
    LlmBackend, LlmError, LlmInvocation, LlmResult, ProviderClient, ProviderEntry,
};

use crate::engine::{Collaborators, EngineSettings, WorkflowEngine};
use crate::store::{MemoryStateStore, StateStore};

pub const TEST_PR_NUMBER: u64 = 7;
pub const TEST_PR_URL: &str = "https://github.com/acme/app/pull/7";

/// Backend answering per purpose; unknown purposes fail as an outage.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    name: String,
    responses: HashMap<String, Result<String, LlmError>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn answer(mut self, purpose: &str, text: &str) -> Self {
        self.responses.insert(purpose.to_string(), Ok(text.to_string()));
        self
    }

    #[must_use]
    pub fn fail(mut self, purpose: &str, err: LlmError) -> Self {
        self.responses.insert(purpose.to_string(), Err(err));
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(inv.purpose.clone());
        }
        match self.responses.get(&inv.purpose) {
            Some(Ok(text)) => Ok(LlmResult::new(text.clone(), self.name.clone(), "scripted")
                .with_tokens(1_000, 1_000)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(LlmError::ProviderOutage(format!("no script for {}", inv.purpose))),
        }
    }
}

#[derive(Debug)]
pub struct MockIssues {
    pub result: Result<String, AdapterError>,
}

#[async_trait]
impl IssueSource for MockIssues {
    async fn fetch(&self, _issue_id: &str) -> Result<String, AdapterError> {
        self.result.clone()
    }
}

/// Pull-request adapter that records calls and replays CI statuses.
///
/// Once the scripted statuses run out, the last one repeats.
#[derive(Debug)]
pub struct MockPulls {
    pub calls: Mutex<Vec<String>>,
    checks: Mutex<VecDeque<CheckStatus>>,
    last_check: Mutex<CheckStatus>,
    pub fail_create_branch: Option<AdapterError>,
    pub pushed: Mutex<Vec<ArtifactFile>>,
}

impl MockPulls {
    #[must_use]
    pub fn with_checks(checks: impl IntoIterator<Item = CheckStatus>) -> Self {
        Self {
            calls: Mutex::default(),
            checks: Mutex::new(checks.into_iter().collect()),
            last_check: Mutex::new(CheckStatus::Success),
            fail_create_branch: None,
            pushed: Mutex::default(),
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn note(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl PullRequestAdapter for MockPulls {
    async fn create_branch(&self, name: &str, base: &str) -> Result<(), AdapterError> {
        self.note(format!("create_branch {name} {base}"));
        match &self.fail_create_branch {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn push_files(
        &self,
        branch: &str,
        files: &[ArtifactFile],
        _message: &str,
    ) -> Result<(), AdapterError> {
        self.note(format!("push_files {branch} {}", files.len()));
        if let Ok(mut pushed) = self.pushed.lock() {
            *pushed = files.to_vec();
        }
        Ok(())
    }

    async fn open_pull_request(
        &self,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, AdapterError> {
        self.note(format!("open_pull_request {} draft={}", request.head, request.draft));
        Ok(PullRequest {
            number: TEST_PR_NUMBER,
            url: TEST_PR_URL.to_string(),
        })
    }

    async fn poll_checks(&self, _pr_number: u64) -> Result<CheckStatus, AdapterError> {
        let next = self.checks.lock().ok().and_then(|mut q| q.pop_front());
        let mut last = self
            .last_check
            .lock()
            .map_err(|_| AdapterError::Transport("mock poisoned".into()))?;
        if let Some(status) = next {
            *last = status;
        }
        Ok(*last)
    }
}

#[derive(Debug)]
pub struct MockPreview {
    pub status: PreviewStatus,
}

#[async_trait]
impl PreviewAdapter for MockPreview {
    async fn resolve_preview_url(&self, _pr_number: u64) -> Result<PreviewStatus, AdapterError> {
        Ok(self.status.clone())
    }
}

#[derive(Debug)]
pub struct MockVisual {
    pub outcome: VisualOutcome,
}

#[async_trait]
impl VisualCheckAdapter for MockVisual {
    async fn run_checks(&self) -> Result<VisualOutcome, AdapterError> {
        Ok(self.outcome.clone())
    }
}

#[derive(Debug, Default)]
pub struct NoUsage;

#[async_trait]
impl UsageSource for NoUsage {
    async fn daily_usage(&self) -> Result<Vec<ProviderUsage>, AdapterError> {
        Ok(Vec::new())
    }
}

pub const GOOD_SPEC: &str = "# Spec\n\nA todo list.";
pub const GOOD_FILES: &str =
    r#"{"files": [{"path": "app/page.tsx", "content": "export default function Home() {}"}]}"#;

/// Settings with millisecond polling so timeouts are quick in tests.
#[must_use]
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        base_branch: "main".to_string(),
        branch_prefix: "shipwright/".to_string(),
        ci_timeout: Duration::from_millis(60),
        ci_poll_interval: Duration::from_millis(5),
        preview_timeout: Duration::from_millis(60),
        preview_poll_interval: Duration::from_millis(5),
    }
}

/// An engine wired entirely to in-memory doubles, with handles to inspect them.
pub struct Harness {
    pub engine: WorkflowEngine,
    pub store: Arc<MemoryStateStore>,
    pub budget: Arc<MemoryBudgetStore>,
    pub guard: Arc<BudgetGuard>,
    pub pulls: Arc<MockPulls>,
    pub primary: Arc<ScriptedBackend>,
    pub secondary: Arc<ScriptedBackend>,
}

pub struct HarnessBuilder {
    primary: ScriptedBackend,
    secondary: ScriptedBackend,
    issues: MockIssues,
    pulls: MockPulls,
    preview: PreviewStatus,
    visual: VisualOutcome,
    cap: Money,
    store: Arc<MemoryStateStore>,
    budget: Arc<MemoryBudgetStore>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            primary: ScriptedBackend::new("primary")
                .answer(crate::prompts::SPEC_PURPOSE, GOOD_SPEC)
                .answer(crate::prompts::CODE_PURPOSE, GOOD_FILES),
            secondary: ScriptedBackend::new("secondary"),
            issues: MockIssues {
                result: Ok("Build a todo app".to_string()),
            },
            pulls: MockPulls::with_checks([CheckStatus::Success]),
            preview: PreviewStatus::Url("https://preview.example.com".to_string()),
            visual: VisualOutcome::Skipped {
                reason: "visual command not configured".to_string(),
            },
            cap: Money::from_usd(5.0),
            store: Arc::new(MemoryStateStore::new()),
            budget: Arc::new(MemoryBudgetStore::new()),
        }
    }
}

impl HarnessBuilder {
    #[must_use]
    pub fn primary(mut self, backend: ScriptedBackend) -> Self {
        self.primary = backend;
        self
    }

    #[must_use]
    pub fn secondary(mut self, backend: ScriptedBackend) -> Self {
        self.secondary = backend;
        self
    }

    #[must_use]
    pub fn issues(mut self, result: Result<String, AdapterError>) -> Self {
        self.issues = MockIssues { result };
        self
    }

    #[must_use]
    pub fn pulls(mut self, pulls: MockPulls) -> Self {
        self.pulls = pulls;
        self
    }

    #[must_use]
    pub fn preview(mut self, status: PreviewStatus) -> Self {
        self.preview = status;
        self
    }

    #[must_use]
    pub fn visual(mut self, outcome: VisualOutcome) -> Self {
        self.visual = outcome;
        self
    }

    #[must_use]
    pub fn cap(mut self, cap: Money) -> Self {
        self.cap = cap;
        self
    }

    /// Share state with another harness, as a restarted process would.
    #[must_use]
    pub fn stores(mut self, store: Arc<MemoryStateStore>, budget: Arc<MemoryBudgetStore>) -> Self {
        self.store = store;
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn build(self) -> Harness {
        let guard = Arc::new(BudgetGuard::new(
            self.budget.clone(),
            Arc::new(LogNotifier),
            self.cap,
            0.8,
        ));
        let primary = Arc::new(self.primary);
        let secondary = Arc::new(self.secondary);
        let price = TokenPrice::new(3.0, 15.0);
        let provider = ProviderClient::new(
            ProviderEntry::new(primary.clone(), price),
            ProviderEntry::new(secondary.clone(), TokenPrice::default()),
            Duration::from_secs(5),
        )
        .with_ledger(guard.clone());

        let pulls = Arc::new(self.pulls);
        let collaborators = Collaborators {
            issues: Arc::new(self.issues),
            pulls: pulls.clone(),
            preview: Arc::new(MockPreview {
                status: self.preview,
            }),
            visual: Arc::new(MockVisual {
                outcome: self.visual,
            }),
            usage: Arc::new(NoUsage),
        };

        let store: Arc<dyn StateStore> = self.store.clone();
        let engine = WorkflowEngine::new(
            store,
            guard.clone(),
            Arc::new(provider),
            collaborators,
            fast_settings(),
        );

        Harness {
            engine,
            store: self.store,
            budget: self.budget,
            guard,
            pulls,
            primary,
            secondary,
        }
    }
}

impl Harness {
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}
