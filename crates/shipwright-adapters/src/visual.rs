//! Visual/performance suite driven by an external command.
//!
//! The suite is best-effort: anything short of actually running it (no command,
//! missing binary, missing token) is `Skipped`, never an error. The command may
//! report metered usage on stdout as `shipwright:snapshots=N` and
//! `shipwright:browser_minutes=F` lines.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shipwright_config::VisualConfig;
use shipwright_utils::error::AdapterError;

use crate::contracts::{VisualCheckAdapter, VisualOutcome};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Clone)]
pub struct CommandVisualChecks {
    command: Option<String>,
    token_env: Option<String>,
    timeout: Duration,
}

impl CommandVisualChecks {
    #[must_use]
    pub fn from_config(config: &VisualConfig) -> Self {
        Self {
            command: config.command.clone(),
            token_env: config.token_env.clone(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments, or the reason the suite cannot run.
    fn resolve(&self) -> Result<(std::path::PathBuf, Vec<String>), String> {
        let command = self
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| "visual command not configured".to_string())?;

        if let Some(var) = &self.token_env
            && std::env::var(var).ok().is_none_or(|v| v.trim().is_empty())
        {
            return Err(format!("{var} is not set"));
        }

        let mut words =
            shell_words::split(command).map_err(|e| format!("unparseable visual command: {e}"))?;
        if words.is_empty() {
            return Err("visual command not configured".to_string());
        }
        let program = words.remove(0);
        let resolved = which::which(&program).map_err(|_| format!("{program} not found on PATH"))?;
        Ok((resolved, words))
    }
}

/// Metered usage lines printed by the suite.
pub(crate) fn parse_usage(stdout: &str) -> (u32, f64) {
    let mut snapshots = 0;
    let mut minutes = 0.0;
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("shipwright:snapshots=") {
            snapshots = value.trim().parse().unwrap_or(snapshots);
        } else if let Some(value) = line.strip_prefix("shipwright:browser_minutes=") {
            minutes = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|m| m.is_finite() && *m >= 0.0)
                .unwrap_or(minutes);
        }
    }
    (snapshots, minutes)
}

fn tail(text: &str) -> &str {
    let mut start = text.len().saturating_sub(STDERR_TAIL);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim()
}

#[async_trait]
impl VisualCheckAdapter for CommandVisualChecks {
    async fn run_checks(&self) -> Result<VisualOutcome, AdapterError> {
        let (program, args) = match self.resolve() {
            Ok(resolved) => resolved,
            Err(reason) => {
                info!(reason = %reason, "Skipping visual checks");
                return Ok(VisualOutcome::Skipped { reason });
            }
        };

        debug!(program = %program.display(), args = ?args, "Running visual checks");
        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AdapterError::Command(format!("failed to spawn {}: {e}", program.display()))
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AdapterError::Command(format!(
                    "failed to wait for visual checks: {e}"
                )));
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Visual checks timed out");
                return Ok(VisualOutcome::Failed {
                    reason: format!("timed out after {}s", self.timeout.as_secs()),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            let (snapshots, browser_minutes) = parse_usage(&stdout);
            Ok(VisualOutcome::Passed {
                snapshots,
                browser_minutes,
            })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Ok(VisualOutcome::Failed {
                reason: format!("exited with {}: {}", output.status, tail(&stderr)),
            })
        }
    }
}
