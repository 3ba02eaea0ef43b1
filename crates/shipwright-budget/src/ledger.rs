use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// What kind of spend an entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Generation,
    BrowserMinutes,
    VisualSnapshots,
}

/// One line in the usage ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: UsageKind,
    /// Billing provider, e.g. `anthropic`, `ollama`, `percy`
    pub provider: String,
    /// Free-form label of what the spend was for
    pub purpose: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Browser minutes or snapshot count, depending on `kind`
    #[serde(default)]
    pub units: f64,
    pub cost: Money,
    pub success: bool,
}

impl UsageEntry {
    #[must_use]
    pub fn generation(
        provider: impl Into<String>,
        purpose: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        cost: Money,
        success: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: UsageKind::Generation,
            provider: provider.into(),
            purpose: purpose.into(),
            input_tokens,
            output_tokens,
            units: 0.0,
            cost,
            success,
        }
    }

    #[must_use]
    pub fn metered(
        kind: UsageKind,
        provider: impl Into<String>,
        purpose: impl Into<String>,
        units: f64,
        cost: Money,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            provider: provider.into(),
            purpose: purpose.into(),
            input_tokens: 0,
            output_tokens: 0,
            units,
            cost,
            success: true,
        }
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Sink for usage entries.
///
/// Recording is infallible from the caller's point of view: implementations
/// log their own failures so the provider fallback loop never has to branch
/// on ledger errors.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn record(&self, entry: UsageEntry);
}
