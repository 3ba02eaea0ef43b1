//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shipwright_engine::StageId;

/// shipwright - requirements in, pull request and preview out
#[derive(Parser, Debug)]
#[command(name = "shipwright")]
#[command(about = "Resumable requirements-to-preview pipeline with provider fallback and a budget kill-switch")]
#[command(long_about = r#"
shipwright turns requirements into a draft pull request with a running preview
through eight fixed stages. Every stage is persisted, so a failed run can be
resumed exactly where it stopped.

EXAMPLES:
  # Run from a GitHub issue; the inline text is used if the issue cannot be read
  shipwright start --issue 42 --spec "A todo list with due dates"

  # Walk the pipeline without touching GitHub, providers, or persisted state
  shipwright start --spec "A todo list" --dry-run

  # Show the recorded run
  shipwright status
  shipwright status --json

  # Retry the failed stage, or restart from a chosen one
  shipwright resume
  shipwright resume 3
  shipwright resume code-generation

  # resume, status and reset also answer to flag form
  shipwright --resume 3
  shipwright --status

  # Budget kill-switch
  shipwright budget report
  shipwright budget halt --reason "runaway retries"
  shipwright budget clear --operator alice

STAGES:
  1 requirements → 2 specification → 3 code-generation → 4 testing →
  5 visual-testing → 6 preview → 7 cost-check → 8 completion

CONFIGURATION:
  Precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .shipwright/config.toml
  State lives under $SHIPWRIGHT_HOME (default: ./.shipwright)
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Try the secondary provider first
    #[arg(long, global = true)]
    pub prefer_secondary: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new pipeline run at stage 1
    Start {
        /// Issue number to read requirements from
        #[arg(long)]
        issue: Option<String>,

        /// Inline requirements text; also the fallback when the issue cannot be read
        #[arg(long)]
        spec: Option<String>,

        /// Describe every external effect instead of performing it
        #[arg(long)]
        dry_run: bool,

        /// Discard any recorded run before starting
        #[arg(long)]
        reset: bool,
    },

    /// Continue the recorded run
    #[command(long_flag = "resume")]
    Resume {
        /// Stage to resume at, by number (3) or name (code-generation).
        /// Defaults to the recorded stage.
        stage: Option<StageId>,

        /// Describe every external effect instead of performing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the recorded run
    #[command(long_flag = "status")]
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Discard the recorded run and its artifacts (refused while a run is live)
    #[command(long_flag = "reset")]
    Reset,

    /// Inspect or operate the budget kill-switch
    #[command(subcommand)]
    Budget(BudgetCommands),
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// Today's spend against the cap
    Report {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop all further stages until cleared
    Halt {
        /// Recorded with the halt and shown to whoever resumes
        #[arg(long)]
        reason: String,
    },

    /// Lift a halt
    Clear {
        /// Who cleared it; kept in the audit trail
        #[arg(long)]
        operator: String,
    },
}
