use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use shipwright_utils::redaction::redact_secrets;

use crate::money::Money;

/// Budget events worth telling an operator about
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetEvent {
    Warning { spent: Money, cap: Money },
    Halted { reason: String, spent: Money, cap: Money },
    Cleared { operator: String },
}

impl BudgetEvent {
    /// One-line, chat-friendly rendering
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Warning { spent, cap } => {
                let pct = if cap.cents() > 0 {
                    spent.cents() * 100 / cap.cents()
                } else {
                    100
                };
                format!(":warning: Pipeline spend at {pct}% of the daily cap ({spent} of {cap})")
            }
            Self::Halted { reason, spent, cap } => {
                format!(":octagonal_sign: Pipeline halted: {reason} ({spent} of {cap})")
            }
            Self::Cleared { operator } => {
                format!(":white_check_mark: Pipeline halt cleared by {operator}")
            }
        }
    }
}

/// Outbound channel for budget events. Delivery failures are logged, never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BudgetEvent);
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &BudgetEvent) {
        warn!(event = %event.message(), "Budget notification");
    }
}

/// Posts `{"text": ...}` to a Slack-compatible incoming webhook and logs the event too.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Build from the env var named in `budget.notify_webhook_env`, if it is set.
    #[must_use]
    pub fn from_env(var: &str) -> Option<Self> {
        let url = std::env::var(var).ok().filter(|u| !u.trim().is_empty())?;
        match Self::new(url) {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                warn!(error = %e, "Failed to build webhook client; using log notifications only");
                None
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &BudgetEvent) {
        LogNotifier.notify(event).await;

        let body = serde_json::json!({ "text": event.message() });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => debug!("Budget webhook delivered"),
            Ok(resp) => warn!(status = resp.status().as_u16(), "Budget webhook rejected"),
            Err(e) => warn!(error = %redact_secrets(&e.to_string()), "Budget webhook failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let warning = BudgetEvent::Warning {
            spent: Money::from_cents(450),
            cap: Money::from_cents(500),
        };
        assert!(warning.message().contains("90%"));
        assert!(warning.message().contains("$4.50 of $5.00"));

        let halted = BudgetEvent::Halted {
            reason: "daily cap reached".into(),
            spent: Money::from_cents(501),
            cap: Money::from_cents(500),
        };
        assert!(halted.message().starts_with(":octagonal_sign: Pipeline halted"));

        let cleared = BudgetEvent::Cleared {
            operator: "dana".into(),
        };
        assert!(cleared.message().contains("dana"));
    }

    #[test]
    fn test_from_env_unset_is_none() {
        assert!(WebhookNotifier::from_env("SHIPWRIGHT_TEST_WEBHOOK_THAT_IS_NEVER_SET").is_none());
    }
}
