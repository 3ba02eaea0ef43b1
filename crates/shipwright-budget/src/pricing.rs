use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Per-million-token prices for one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

impl TokenPrice {
    #[must_use]
    pub const fn new(input_usd_per_mtok: f64, output_usd_per_mtok: f64) -> Self {
        Self {
            input_usd_per_mtok,
            output_usd_per_mtok,
        }
    }

    /// Cost of one call, rounded to cents.
    #[must_use]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Money {
        let usd = (input_tokens as f64 * self.input_usd_per_mtok
            + output_tokens as f64 * self.output_usd_per_mtok)
            / 1_000_000.0;
        Money::from_usd(usd)
    }
}

/// Token estimate for providers that report no usage: one token per four characters.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Unit prices for metered, non-generation spend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub browser_minute_usd: f64,
    pub snapshot_usd: f64,
}

impl Pricing {
    #[must_use]
    pub fn browser_minutes(&self, minutes: f64) -> Money {
        Money::from_usd(minutes.max(0.0) * self.browser_minute_usd)
    }

    #[must_use]
    pub fn snapshots(&self, count: u32) -> Money {
        Money::from_usd(f64::from(count) * self.snapshot_usd)
    }
}

impl From<&shipwright_config::BudgetConfig> for Pricing {
    fn from(config: &shipwright_config::BudgetConfig) -> Self {
        Self {
            browser_minute_usd: config.browser_minute_usd,
            snapshot_usd: config.snapshot_usd,
        }
    }
}
