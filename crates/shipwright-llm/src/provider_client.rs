//! Provider Client: ordered fallback across two interchangeable backends.
//!
//! Providers are tried one at a time, each under a hard timeout, and never
//! retried. A provider counts as failed when the call errors, times out, returns
//! an empty payload, or (for JSON requests) returns text that no repair strategy
//! can turn into JSON. Every attempt is written to the usage ledger.
//!
//! `generate` never returns an error: total failure is `ProviderUsed::None` with
//! `parsed` absent, and the caller picks the last-resort policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use shipwright_budget::{Money, TokenPrice, UsageEntry, UsageLedger, estimate_tokens};
use shipwright_utils::error::LlmError;
use shipwright_utils::redaction::redact_secrets;

use crate::repair::{RepairStrategy, parse_json};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message};

/// Which backend satisfied a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderUsed {
    Primary,
    Secondary,
    None,
}

impl ProviderUsed {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for ProviderUsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape the caller wants back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Text,
    Json,
}

/// Validated result of a successful call
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    /// The call itself failed; carries the redacted reason
    Failed(String),
    /// The call answered but no repair strategy produced JSON
    Unparseable,
}

/// One provider attempt, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub slot: ProviderUsed,
    pub provider: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCallResult {
    pub provider_used: ProviderUsed,
    /// Raw text of the accepted answer, or of the last unparseable one
    pub raw_output: String,
    pub parsed: Option<Parsed>,
    /// How the JSON was recovered, when it was
    pub repair: Option<RepairStrategy>,
    pub attempts: Vec<AttemptRecord>,
}

impl ProviderCallResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.parsed.is_some()
    }

    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.parsed {
            Some(Parsed::Json(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.parsed {
            Some(Parsed::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// Opaque prompt: a purpose label plus the message bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub purpose: String,
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    #[must_use]
    pub fn new(purpose: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            system: None,
            user: user.into(),
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    fn to_invocation(&self, timeout: Duration) -> LlmInvocation {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.user.clone()));
        LlmInvocation::new(self.purpose.clone(), timeout, messages)
    }
}

/// A backend together with the price used to cost its calls
#[derive(Clone)]
pub struct ProviderEntry {
    pub backend: Arc<dyn LlmBackend>,
    pub price: TokenPrice,
}

impl ProviderEntry {
    pub fn new(backend: Arc<dyn LlmBackend>, price: TokenPrice) -> Self {
        Self { backend, price }
    }
}

pub struct ProviderClient {
    primary: ProviderEntry,
    secondary: ProviderEntry,
    prefer_secondary: bool,
    timeout: Duration,
    ledger: Option<Arc<dyn UsageLedger>>,
}

impl ProviderClient {
    pub fn new(primary: ProviderEntry, secondary: ProviderEntry, timeout: Duration) -> Self {
        Self {
            primary,
            secondary,
            prefer_secondary: false,
            timeout,
            ledger: None,
        }
    }

    #[must_use]
    pub fn with_prefer_secondary(mut self, prefer_secondary: bool) -> Self {
        self.prefer_secondary = prefer_secondary;
        self
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn order(&self) -> [(ProviderUsed, &ProviderEntry); 2] {
        let primary = (ProviderUsed::Primary, &self.primary);
        let secondary = (ProviderUsed::Secondary, &self.secondary);
        if self.prefer_secondary {
            [secondary, primary]
        } else {
            [primary, secondary]
        }
    }

    /// Obtain a result from the first provider that yields a usable answer.
    pub async fn generate(&self, prompt: &Prompt, shape: ExpectedShape) -> ProviderCallResult {
        let mut attempts = Vec::with_capacity(2);
        let mut last_raw = String::new();

        for (slot, entry) in self.order() {
            let provider = entry.backend.name().to_string();
            let invocation = prompt.to_invocation(self.timeout);
            let prompt_tokens = estimate_tokens(&prompt_text(prompt));

            debug!(
                purpose = %prompt.purpose,
                provider = %provider,
                slot = %slot,
                "Invoking provider"
            );

            let answer = match tokio::time::timeout(self.timeout, entry.backend.invoke(invocation))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    duration: self.timeout,
                }),
            };

            let answer = answer.and_then(|result| {
                if result.raw_response.trim().is_empty() {
                    Err(LlmError::EmptyResponse(provider.clone()))
                } else {
                    Ok(result)
                }
            });

            let result = match answer {
                Ok(result) => result,
                Err(err) => {
                    let reason = redact_secrets(&err.to_string());
                    warn!(
                        purpose = %prompt.purpose,
                        provider = %provider,
                        error = %reason,
                        "Provider call failed, trying next provider"
                    );
                    self.record(UsageEntry::generation(
                        &provider,
                        &prompt.purpose,
                        prompt_tokens,
                        0,
                        Money::ZERO,
                        false,
                    ))
                    .await;
                    attempts.push(AttemptRecord {
                        slot,
                        provider,
                        outcome: AttemptOutcome::Failed(reason),
                    });
                    continue;
                }
            };

            let (input_tokens, output_tokens) = usage_of(&result, prompt_tokens);
            let cost = entry.price.cost(input_tokens, output_tokens);

            let accepted = match shape {
                ExpectedShape::Text => Some((Parsed::Text(result.raw_response.clone()), None)),
                ExpectedShape::Json => parse_json(&result.raw_response)
                    .map(|(value, strategy)| (Parsed::Json(value), Some(strategy))),
            };

            self.record(UsageEntry::generation(
                &provider,
                &prompt.purpose,
                input_tokens,
                output_tokens,
                cost,
                accepted.is_some(),
            ))
            .await;

            match accepted {
                Some((parsed, repair)) => {
                    if let Some(strategy) = repair
                        && strategy != RepairStrategy::Strict
                    {
                        debug!(provider = %provider, strategy = ?strategy, "Repaired JSON output");
                    }
                    info!(
                        purpose = %prompt.purpose,
                        provider = %provider,
                        slot = %slot,
                        cost = %cost,
                        "Provider call succeeded"
                    );
                    attempts.push(AttemptRecord {
                        slot,
                        provider,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return ProviderCallResult {
                        provider_used: slot,
                        raw_output: result.raw_response,
                        parsed: Some(parsed),
                        repair,
                        attempts,
                    };
                }
                None => {
                    warn!(
                        purpose = %prompt.purpose,
                        provider = %provider,
                        "Provider output is not repairable JSON, trying next provider"
                    );
                    attempts.push(AttemptRecord {
                        slot,
                        provider,
                        outcome: AttemptOutcome::Unparseable,
                    });
                    last_raw = result.raw_response;
                }
            }
        }

        warn!(purpose = %prompt.purpose, "All providers exhausted");
        ProviderCallResult {
            provider_used: ProviderUsed::None,
            raw_output: last_raw,
            parsed: None,
            repair: None,
            attempts,
        }
    }

    async fn record(&self, entry: UsageEntry) {
        if let Some(ledger) = &self.ledger {
            ledger.record(entry).await;
        }
    }
}

fn prompt_text(prompt: &Prompt) -> String {
    match &prompt.system {
        Some(system) => format!("{system}{}", prompt.user),
        None => prompt.user.clone(),
    }
}

/// Reported token usage, or the character estimate for whatever is missing.
fn usage_of(result: &LlmResult, prompt_tokens: u64) -> (u64, u64) {
    let input = result.tokens_input.unwrap_or(prompt_tokens);
    let output = result
        .tokens_output
        .unwrap_or_else(|| estimate_tokens(&result.raw_response));
    (input, output)
}
