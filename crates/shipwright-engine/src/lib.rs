//! Resumable eight-stage workflow engine for shipwright
//!
//! Stages run strictly in order; the budget guard is consulted before each one
//! and the workflow record is persisted after each one. A failed stage freezes
//! the record at that stage so `resume` retries exactly it.

mod dry_run;
pub mod engine;
pub mod fallback;
pub mod lock;
pub mod polling;
pub mod prompts;
pub mod stage;
mod stages;
pub mod state;
pub mod store;
pub mod summary;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use dry_run::{DryRunReport, DryRunRequest};
pub use engine::{Collaborators, EngineSettings, RunReport, WorkflowEngine};
pub use fallback::fallback_artifacts;
pub use lock::{DEFAULT_LOCK_TTL, LockInfo, RunLock};
pub use stage::{StageId, StageOutcome};
pub use stages::{VISUAL_PROVIDER, branch_name, validate_artifact};
pub use state::{
    ArtifactOrigin, CostReport, GeneratedArtifact, PREVIEW_UNKNOWN, RequirementsSource,
    StageRecord, WorkflowContext, WorkflowState, WorkflowStatus,
};
pub use store::{FILES_ARTIFACT, FileStateStore, MemoryStateStore, SPEC_ARTIFACT, StateStore};
pub use summary::render_summary;
