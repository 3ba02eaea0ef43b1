//! LLM layer for shipwright
//!
//! Two interchangeable backends sit behind the `LlmBackend` trait: the Anthropic
//! Messages API (primary) and a local Ollama server (secondary). The
//! [`ProviderClient`] tries them in order with a timeout, repairs JSON output,
//! and records every attempt in the usage ledger.

mod anthropic;
mod call_cap;
pub(crate) mod http_client;
mod ollama;
pub mod provider_client;
pub mod repair;
mod stub;
mod types;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use shipwright_budget::{TokenPrice, UsageLedger};
use shipwright_config::LlmConfig;

pub use anthropic::AnthropicBackend;
pub use call_cap::{CallCappedBackend, DEFAULT_MAX_CALLS_PER_RUN};
pub use ollama::OllamaBackend;
pub use provider_client::{
    AttemptOutcome, AttemptRecord, ExpectedShape, Parsed, Prompt, ProviderCallResult,
    ProviderClient, ProviderEntry, ProviderUsed,
};
pub use repair::{RepairStrategy, parse_json};
pub use shipwright_utils::error::LlmError;
pub use stub::StubBackend;
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

/// Stand-in for a provider that could not be constructed.
///
/// Every call fails with the construction error, so the provider client falls
/// back exactly as it would for a provider that is down.
pub struct UnconfiguredBackend {
    name: &'static str,
    reason: String,
}

impl UnconfiguredBackend {
    #[must_use]
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for UnconfiguredBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        Err(LlmError::Misconfiguration(self.reason.clone()))
    }
}

fn capped(backend: Arc<dyn LlmBackend>, limit: u32) -> Arc<dyn LlmBackend> {
    Arc::new(CallCappedBackend::new(backend, limit))
}

/// Build the production provider client from configuration.
///
/// A backend that fails to construct (e.g. missing API key) is replaced by an
/// [`UnconfiguredBackend`] rather than failing the run; the other provider can
/// still serve every call.
pub fn build_provider_client(
    config: &LlmConfig,
    ledger: Option<Arc<dyn UsageLedger>>,
) -> ProviderClient {
    let primary: Arc<dyn LlmBackend> = match AnthropicBackend::from_config(&config.primary) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            warn!(error = %err, "Primary provider unavailable, secondary will serve all calls");
            Arc::new(UnconfiguredBackend::new("anthropic", err.to_string()))
        }
    };
    let secondary: Arc<dyn LlmBackend> = match OllamaBackend::from_config(&config.secondary) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            warn!(error = %err, "Secondary provider unavailable");
            Arc::new(UnconfiguredBackend::new("ollama", err.to_string()))
        }
    };

    let client = ProviderClient::new(
        ProviderEntry::new(
            capped(primary, config.max_calls_per_run),
            TokenPrice::new(
                config.primary.input_usd_per_mtok,
                config.primary.output_usd_per_mtok,
            ),
        ),
        ProviderEntry::new(
            capped(secondary, config.max_calls_per_run),
            TokenPrice::new(
                config.secondary.input_usd_per_mtok,
                config.secondary.output_usd_per_mtok,
            ),
        ),
        config.timeout(),
    )
    .with_prefer_secondary(config.prefer_secondary);

    match ledger {
        Some(ledger) => client.with_ledger(ledger),
        None => client,
    }
}

/// Provider client whose both slots answer from one deterministic backend.
///
/// Used by dry runs: no network, no spend.
pub fn stub_provider_client(stub: Arc<dyn LlmBackend>, timeout: Duration) -> ProviderClient {
    ProviderClient::new(
        ProviderEntry::new(stub.clone(), TokenPrice::default()),
        ProviderEntry::new(stub, TokenPrice::default()),
        timeout,
    )
}
