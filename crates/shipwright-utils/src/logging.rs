//! Tracing setup and structured stage logging.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_secrets;

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `--verbose` selects
/// `shipwright=debug,info` and the default is `shipwright=info,warn`.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("shipwright=debug,info")
            } else {
                EnvFilter::try_new("shipwright=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_span_events(if verbose { FmtSpan::CLOSE } else { FmtSpan::NONE })
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;

    Ok(())
}

/// Span wrapping a single stage execution
pub fn stage_span(stage: u8, name: &str) -> tracing::Span {
    span!(Level::INFO, "stage_execution", stage = stage, name = %name)
}

pub fn log_stage_start(stage: u8, name: &str) {
    info!(stage = stage, name = %name, "Starting stage");
}

pub fn log_stage_complete(stage: u8, name: &str, outcome: &str, duration_ms: u128) {
    info!(
        stage = stage,
        name = %name,
        outcome = %outcome,
        duration_ms = %duration_ms,
        "Stage finished"
    );
}

/// Log stage failure; the error text is redacted first.
pub fn log_stage_error(stage: u8, name: &str, error: &str, duration_ms: u128) {
    let sanitized_error = redact_secrets(error);
    error!(
        stage = stage,
        name = %name,
        duration_ms = %duration_ms,
        error = %sanitized_error,
        "Stage failed"
    );
}
