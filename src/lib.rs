//! shipwright - resumable requirements-to-preview pipeline
//!
//! Takes requirements from an issue or inline text through eight fixed stages:
//! requirements, specification, code generation, CI testing, visual testing,
//! preview, cost check, and completion. Generation falls back from the primary
//! to the secondary provider, and a daily budget guard can halt everything.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Run the whole pipeline from an issue, falling back to inline text
//! shipwright start --issue 42 --spec "A todo list with due dates"
//!
//! # See what a run would do without touching GitHub or any provider
//! shipwright start --spec "A todo list" --dry-run
//!
//! # Inspect and continue a failed run
//! shipwright status --json
//! shipwright resume
//! shipwright resume code-generation
//!
//! # The kill-switch
//! shipwright budget halt --reason "runaway loop"
//! shipwright budget clear --operator alice
//! ```
//!
//! # Library
//!
//! The pipeline lives in the workspace crates, re-exported here:
//!
//! - [`engine`]: [`WorkflowEngine`], stages, persisted state
//! - [`budget`]: [`BudgetGuard`] and its stores
//! - [`llm`]: the provider client with fallback and JSON repair
//! - [`adapters`]: GitHub, visual checks, dry-run stubs
//! - [`config`]: discovery and validation of `.shipwright/config.toml`
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Internal error |
//! | 2 | Invalid input or configuration |
//! | 3 | Requirements source unavailable |
//! | 4 | Budget exceeded or halted |
//! | 9 | Another run is in progress |
//! | 10 | Timeout |
//! | 70 | Every generation provider failed |

pub mod cli;

pub use shipwright_adapters as adapters;
pub use shipwright_budget as budget;
pub use shipwright_config as config;
pub use shipwright_engine as engine;
pub use shipwright_llm as llm;
pub use shipwright_utils as utils;

pub use shipwright_budget::BudgetGuard;
pub use shipwright_config::{CliArgs, Config};
pub use shipwright_engine::{RequirementsSource, StageId, WorkflowEngine, WorkflowState};
pub use shipwright_utils::{ErrorKind, ExitCode, ShipwrightError};
