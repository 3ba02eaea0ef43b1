//! Workflows across process boundaries: everything goes through the on-disk
//! stores, and each "process" is a freshly built engine over the same home.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use shipwright_adapters::{CheckStatus, PreviewStatus, VisualOutcome};
use shipwright_budget::{BudgetGuard, FileBudgetStore, LogNotifier, Money, TokenPrice};
use shipwright_engine::testing::{
    GOOD_FILES, GOOD_SPEC, MockIssues, MockPreview, MockPulls, MockVisual, NoUsage,
    ScriptedBackend, fast_settings,
};
use shipwright_engine::{
    Collaborators, DEFAULT_LOCK_TTL, FileStateStore, LockInfo, RequirementsSource, RunLock,
    StageId, StateStore, WorkflowEngine, WorkflowState, WorkflowStatus,
};
use shipwright_llm::{LlmError, ProviderClient, ProviderEntry};
use shipwright_utils::ErrorKind;

struct Process {
    engine: WorkflowEngine,
    guard: Arc<BudgetGuard>,
    store: FileStateStore,
}

fn home() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

fn good_primary() -> ScriptedBackend {
    ScriptedBackend::new("primary")
        .answer("specification", GOOD_SPEC)
        .answer("code-generation", GOOD_FILES)
}

fn process(home: &Utf8Path, primary: ScriptedBackend) -> Process {
    let guard = Arc::new(BudgetGuard::new(
        Arc::new(FileBudgetStore::new(home.join("budget"))),
        Arc::new(LogNotifier),
        Money::from_usd(5.0),
        0.8,
    ));
    let provider = ProviderClient::new(
        ProviderEntry::new(Arc::new(primary), TokenPrice::new(3.0, 15.0)),
        ProviderEntry::new(Arc::new(ScriptedBackend::new("secondary")), TokenPrice::default()),
        Duration::from_secs(5),
    )
    .with_ledger(guard.clone());

    let collaborators = Collaborators {
        issues: Arc::new(MockIssues {
            result: Ok("Build a todo app".to_string()),
        }),
        pulls: Arc::new(MockPulls::with_checks([CheckStatus::Pending, CheckStatus::Success])),
        preview: Arc::new(MockPreview {
            status: PreviewStatus::Url("https://preview.example.com".to_string()),
        }),
        visual: Arc::new(MockVisual {
            outcome: VisualOutcome::Skipped {
                reason: "visual command not configured".to_string(),
            },
        }),
        usage: Arc::new(NoUsage),
    };

    let store = FileStateStore::new(home.join("state"), home.join("artifacts"));
    let engine = WorkflowEngine::new(
        Arc::new(store.clone()),
        guard.clone(),
        Arc::new(provider),
        collaborators,
        fast_settings(),
    )
    .with_lock(home.join("run.lock"));

    Process {
        engine,
        guard,
        store,
    }
}

#[tokio::test]
async fn failed_stage_survives_restart_and_resume_finishes() {
    let (_dir, home) = home();

    let first = process(
        &home,
        ScriptedBackend::new("primary")
            .fail("specification", LlmError::ProviderOutage("503".into())),
    );
    let err = first
        .engine
        .start(RequirementsSource::issue("42"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::GenerationFailed));

    let persisted = first.store.load().unwrap().expect("state on disk");
    assert_eq!(persisted.status, WorkflowStatus::Failed);
    assert_eq!(persisted.current_stage, StageId::Specification);
    assert!(persisted.details.contains("GenerationFailed"));
    assert_eq!(
        persisted.context.requirements_text.as_deref(),
        Some("Build a todo app")
    );
    drop(first);

    let second = process(&home, good_primary());
    let report = second.engine.resume(None).await.unwrap();

    assert_eq!(report.state.status, WorkflowStatus::Completed);
    assert!(report.summary.starts_with("Pipeline completed"));
    assert_eq!(report.state.context.stages.len(), 8);
    assert!(second.store.load().unwrap().is_none());
    assert_eq!(
        second.store.read_artifact("spec.md").unwrap().as_deref(),
        Some(GOOD_SPEC)
    );
    assert!(second.store.read_artifact("files.json").unwrap().is_some());

    let budget = second.guard.report_daily().await.unwrap();
    assert!(budget.spent > Money::from_cents(0));
    assert!(!budget.entries.is_empty());
    assert!(!home.join("run.lock").exists());
}

#[tokio::test]
async fn held_run_lock_reports_already_running() {
    let (_dir, home) = home();
    let p = process(&home, good_primary());

    let lock = RunLock::acquire(&home.join("run.lock"), DEFAULT_LOCK_TTL).unwrap();
    let err = p
        .engine
        .start(RequirementsSource::text("todo app"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));
    assert!(p.store.load().unwrap().is_none());
    drop(lock);

    let report = p.engine.start(RequirementsSource::text("todo app")).await.unwrap();
    assert_eq!(report.state.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn halt_from_one_process_stops_the_next() {
    let (_dir, home) = home();

    let operator = process(&home, good_primary());
    operator.guard.halt("runaway retries").await.unwrap();
    drop(operator);

    let runner = process(&home, good_primary());
    let err = runner
        .engine
        .start(RequirementsSource::text("todo app"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::BudgetExceeded));
    assert!(err.to_string().contains("runaway retries"));

    let state = runner.store.load().unwrap().unwrap();
    assert_eq!(state.current_stage, StageId::Requirements);
    assert_eq!(state.status, WorkflowStatus::Failed);

    runner.guard.clear("alice").await.unwrap();
    let report = runner.engine.resume(None).await.unwrap();
    assert_eq!(report.state.status, WorkflowStatus::Completed);
}

/// Above every platform's pid ceiling, so never a running process
const EXITED_PID: u32 = i32::MAX as u32;

/// The lock a process leaves behind when it is killed mid-run
fn write_crashed_lock(home: &Utf8Path) {
    let info = LockInfo {
        pid: EXITED_PID,
        created_at: Utc::now(),
        version: "0.4.0".to_string(),
    };
    std::fs::write(home.join("run.lock"), serde_json::to_string(&info).unwrap()).unwrap();
}

#[tokio::test]
async fn lock_left_by_killed_process_does_not_block_resume() {
    let (_dir, home) = home();

    let first = process(
        &home,
        ScriptedBackend::new("primary")
            .fail("specification", LlmError::ProviderOutage("503".into())),
    );
    first
        .engine
        .start(RequirementsSource::text("todo app"))
        .await
        .unwrap_err();
    drop(first);
    write_crashed_lock(&home);

    let second = process(&home, good_primary());
    let report = second.engine.resume(None).await.unwrap();
    assert_eq!(report.state.status, WorkflowStatus::Completed);
    assert!(!home.join("run.lock").exists());
}

#[tokio::test]
async fn start_over_refuses_while_another_process_holds_the_lock() {
    let (_dir, home) = home();
    let p = process(&home, good_primary());
    let mut live = WorkflowState::new(RequirementsSource::text("todo app"), Utc::now());
    live.current_stage = StageId::Testing;
    p.store.save(&live).unwrap();

    let lock = RunLock::acquire(&home.join("run.lock"), DEFAULT_LOCK_TTL).unwrap();
    let err = p
        .engine
        .start_over(RequirementsSource::text("another app"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AlreadyRunning));
    assert_eq!(p.store.load().unwrap(), Some(live));
    drop(lock);
}

#[tokio::test]
async fn reset_discards_state_artifacts_and_crashed_lock() {
    let (_dir, home) = home();
    let p = process(&home, good_primary());

    p.store
        .save(&WorkflowState::new(
            RequirementsSource::text("todo app"),
            Utc::now(),
        ))
        .unwrap();
    p.store.write_artifact("spec.md", GOOD_SPEC).unwrap();
    write_crashed_lock(&home);

    assert!(p.engine.reset().unwrap());
    assert!(p.store.load().unwrap().is_none());
    assert!(p.store.read_artifact("spec.md").unwrap().is_none());
    assert!(!home.join("run.lock").exists());
    assert!(!p.engine.reset().unwrap());
}
