//! Dry runs: the real stage sequence against a shadow engine.
//!
//! The shadow engine gets in-memory copies of the persisted workflow and budget
//! records, the stub collaborators, and a stub provider. Nothing it does
//! reaches disk or the network; every skipped effect is described in order.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use shipwright_adapters::{
    DryRunIssueSource, DryRunPreview, DryRunPullRequests, DryRunVisualChecks, EffectLog,
    LedgerUsageSource,
};
use shipwright_budget::BudgetGuard;
use shipwright_llm::{LlmBackend, LlmError, LlmInvocation, LlmResult, StubBackend, stub_provider_client};
use shipwright_utils::ShipwrightError;

use crate::engine::{Collaborators, RunReport, WorkflowEngine};
use crate::prompts::{CODE_PURPOSE, SPEC_PURPOSE};
use crate::stage::StageId;
use crate::state::RequirementsSource;
use crate::store::MemoryStateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunRequest {
    Start {
        source: RequirementsSource,
        /// Pretend the persisted record was discarded first
        reset: bool,
    },
    Resume(Option<StageId>),
}

#[derive(Debug)]
pub struct DryRunReport {
    /// Descriptions of the skipped external effects, in order
    pub effects: Vec<String>,
    /// What the real run would have returned
    pub outcome: Result<RunReport, ShipwrightError>,
}

impl Collaborators {
    /// Stub collaborators recording into `log`; usage comes from `guard`'s ledger.
    #[must_use]
    pub fn dry_run(log: &EffectLog, guard: Arc<BudgetGuard>) -> Self {
        Self {
            issues: Arc::new(DryRunIssueSource::new(log.clone())),
            pulls: Arc::new(DryRunPullRequests::new(log.clone())),
            preview: Arc::new(DryRunPreview::new(log.clone())),
            visual: Arc::new(DryRunVisualChecks::new(log.clone())),
            usage: Arc::new(LedgerUsageSource::new(guard)),
        }
    }
}

/// Stub provider that notes each generation request it answers.
struct RecordingBackend {
    inner: StubBackend,
    log: EffectLog,
}

#[async_trait]
impl LlmBackend for RecordingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        self.log
            .record(format!("would request {} from the generation provider", inv.purpose));
        self.inner.invoke(inv).await
    }
}

fn stub_responses() -> StubBackend {
    let files = json!({
        "files": [
            {"path": "app/page.tsx", "content": "export default function Home() { return null; }\n"}
        ]
    });
    StubBackend::new("dry run")
        .with_response(SPEC_PURPOSE, "# Specification\n\nDry-run placeholder specification.\n")
        .with_response(CODE_PURPOSE, files.to_string())
}

impl WorkflowEngine {
    /// Walk `request` through the stage sequence without side effects.
    ///
    /// # Errors
    ///
    /// Only when the persisted records cannot be read to seed the shadow engine;
    /// pipeline failures are reported in `DryRunReport::outcome`.
    pub async fn dry_run(&self, request: DryRunRequest) -> Result<DryRunReport, ShipwrightError> {
        let log = EffectLog::new();

        let persisted = match &request {
            DryRunRequest::Start { reset: true, .. } => {
                log.record("would discard the recorded pipeline state");
                None
            }
            _ => self.store.load()?,
        };

        let guard = Arc::new(self.guard.dry_run_copy()?);
        let backend: Arc<dyn LlmBackend> = Arc::new(RecordingBackend {
            inner: stub_responses(),
            log: log.clone(),
        });
        let provider = stub_provider_client(backend, self.provider.timeout())
            .with_ledger(guard.clone());

        let shadow = WorkflowEngine::new(
            Arc::new(MemoryStateStore::with_state(persisted)),
            guard.clone(),
            Arc::new(provider),
            Collaborators::dry_run(&log, guard),
            self.settings.clone(),
        );

        let outcome = match request {
            DryRunRequest::Start { source, .. } => shadow.start(source).await,
            DryRunRequest::Resume(stage) => shadow.resume(stage).await,
        };

        Ok(DryRunReport {
            effects: log.entries(),
            outcome,
        })
    }
}
