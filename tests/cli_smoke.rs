//! End-to-end checks of the `shipwright` binary.
//!
//! Every test gets its own home directory through `SHIPWRIGHT_HOME` and runs
//! from inside it, so no config file or state from the developer's checkout
//! leaks in. Nothing here reaches GitHub or a provider.

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn shipwright(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("shipwright"));
    cmd.current_dir(home)
        .env("SHIPWRIGHT_HOME", home)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null());
    cmd
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("budget"));
}

#[test]
fn status_with_nothing_recorded() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pipeline run recorded"));

    shipwright(home.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "not_started""#))
        .stdout(predicate::str::contains(r#""current_stage": 1"#));
}

#[test]
fn start_without_source_is_invalid_input() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .arg("start")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));

    assert!(!home.path().join("state").join("workflow.json").exists());
}

#[test]
fn resume_with_nothing_recorded_is_invalid_input() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .arg("resume")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nothing to resume"));
}

#[test]
fn resume_rejects_unknown_stage() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .args(["resume", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stage must be between 1 and 8"));
}

#[test]
fn dry_run_start_walks_every_stage_without_persisting() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .args(["start", "--spec", "A todo list", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("would request specification"))
        .stdout(predicate::str::contains("would create branch"))
        .stdout(predicate::str::contains("Pipeline completed"));

    assert!(!home.path().join("state").join("workflow.json").exists());
    assert!(!home.path().join("artifacts").join("spec.md").exists());
}

#[test]
fn budget_halt_blocks_start_until_cleared() {
    let home = TempDir::new().unwrap();

    shipwright(home.path())
        .args(["budget", "halt", "--reason", "runaway retries"])
        .assert()
        .success()
        .stdout(predicate::str::contains("halted"));

    shipwright(home.path())
        .args(["budget", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HALTED: runaway retries"));

    shipwright(home.path())
        .args(["start", "--spec", "A todo list"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("stage 1"));

    shipwright(home.path())
        .args(["budget", "clear", "--operator", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared by alice"));

    shipwright(home.path())
        .args(["budget", "report", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""halted": false"#));
}

#[test]
fn halt_requires_a_reason() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .args(["budget", "halt", "--reason", "  "])
        .assert()
        .failure();
}

#[test]
fn reset_with_nothing_recorded() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to reset"));
}

#[test]
fn flag_forms_answer_like_subcommands() {
    let home = TempDir::new().unwrap();
    shipwright(home.path())
        .arg("--status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pipeline run recorded"));

    shipwright(home.path())
        .arg("--reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to reset"));

    shipwright(home.path())
        .arg("--resume")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nothing to resume"));
}
