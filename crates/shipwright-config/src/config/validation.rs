use shipwright_utils::error::ConfigError;

use super::Config;

impl Config {
    /// Check value ranges and cross-field constraints.
    ///
    /// All problems are collected into a single `ValidationFailed` error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if !(self.budget.daily_cap_usd.is_finite() && self.budget.daily_cap_usd > 0.0) {
            errors.push(format!(
                "budget.daily_cap_usd must be positive, got {}",
                self.budget.daily_cap_usd
            ));
        }
        if !(self.budget.warn_ratio > 0.0 && self.budget.warn_ratio <= 1.0) {
            errors.push(format!(
                "budget.warn_ratio must be in (0, 1], got {}",
                self.budget.warn_ratio
            ));
        }
        for (key, value) in [
            ("budget.browser_minute_usd", self.budget.browser_minute_usd),
            ("budget.snapshot_usd", self.budget.snapshot_usd),
            ("llm.primary.input_usd_per_mtok", self.llm.primary.input_usd_per_mtok),
            ("llm.primary.output_usd_per_mtok", self.llm.primary.output_usd_per_mtok),
            ("llm.secondary.input_usd_per_mtok", self.llm.secondary.input_usd_per_mtok),
            ("llm.secondary.output_usd_per_mtok", self.llm.secondary.output_usd_per_mtok),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(format!("{key} must be non-negative, got {value}"));
            }
        }

        if self.llm.timeout_secs == 0 {
            errors.push("llm.timeout_secs must be greater than 0".to_string());
        }

        let p = &self.pipeline;
        if p.ci_poll_interval_secs == 0 {
            errors.push("pipeline.ci_poll_interval_secs must be greater than 0".to_string());
        }
        if p.preview_poll_interval_secs == 0 {
            errors.push("pipeline.preview_poll_interval_secs must be greater than 0".to_string());
        }
        if p.ci_timeout_secs < p.ci_poll_interval_secs {
            errors.push(format!(
                "pipeline.ci_timeout_secs ({}) must be at least ci_poll_interval_secs ({})",
                p.ci_timeout_secs, p.ci_poll_interval_secs
            ));
        }
        if p.preview_timeout_secs < p.preview_poll_interval_secs {
            errors.push(format!(
                "pipeline.preview_timeout_secs ({}) must be at least preview_poll_interval_secs ({})",
                p.preview_timeout_secs, p.preview_poll_interval_secs
            ));
        }

        if let Some(repo) = &self.github.repo {
            let parts: Vec<&str> = repo.split('/').collect();
            if parts.len() != 2 || parts.iter().any(|s| s.trim().is_empty()) {
                errors.push(format!("github.repo must be 'owner/name', got '{repo}'"));
            }
        }

        if self.defaults.base_branch.trim().is_empty() {
            errors.push("defaults.base_branch must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }
}
