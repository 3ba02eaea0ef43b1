//! Usage source backed by the budget guard's own ledger.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use shipwright_budget::{BudgetGuard, Money};
use shipwright_utils::error::AdapterError;

use crate::contracts::{ProviderUsage, UsageSource};

/// Reports today's tokens and cost per provider from the ledger entries.
pub struct LedgerUsageSource {
    guard: Arc<BudgetGuard>,
}

impl LedgerUsageSource {
    pub fn new(guard: Arc<BudgetGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl UsageSource for LedgerUsageSource {
    async fn daily_usage(&self) -> Result<Vec<ProviderUsage>, AdapterError> {
        let report = self
            .guard
            .report_daily()
            .await
            .map_err(|e| AdapterError::Transport(format!("budget ledger unreadable: {e}")))?;

        let mut per_provider: BTreeMap<String, (u64, Money)> = BTreeMap::new();
        for entry in &report.entries {
            let slot = per_provider
                .entry(entry.provider.clone())
                .or_insert((0, Money::ZERO));
            slot.0 += entry.total_tokens();
            slot.1 += entry.cost;
        }

        Ok(per_provider
            .into_iter()
            .map(|(provider, (tokens, cost))| ProviderUsage {
                provider,
                tokens,
                cost,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_budget::{LogNotifier, MemoryBudgetStore, UsageEntry};

    #[tokio::test]
    async fn test_groups_by_provider() {
        let guard = Arc::new(BudgetGuard::new(
            Arc::new(MemoryBudgetStore::new()),
            Arc::new(LogNotifier),
            Money::from_usd(5.0),
            0.8,
        ));
        guard
            .record_entry(UsageEntry::generation("anthropic", "spec", 100, 50, Money::from_cents(3), true))
            .await
            .unwrap();
        guard
            .record_entry(UsageEntry::generation("anthropic", "code", 10, 5, Money::from_cents(2), true))
            .await
            .unwrap();
        guard
            .record_entry(UsageEntry::generation("ollama", "code", 7, 0, Money::ZERO, false))
            .await
            .unwrap();

        let usage = LedgerUsageSource::new(guard).daily_usage().await.unwrap();

        assert_eq!(
            usage,
            vec![
                ProviderUsage {
                    provider: "anthropic".to_string(),
                    tokens: 165,
                    cost: Money::from_cents(5),
                },
                ProviderUsage {
                    provider: "ollama".to_string(),
                    tokens: 7,
                    cost: Money::ZERO,
                },
            ]
        );
    }
}
