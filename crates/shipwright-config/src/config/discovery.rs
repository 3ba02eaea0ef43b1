use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::model::TomlConfig;
use super::{CliArgs, Config, ConfigSource};

/// Copy an optional file value into the effective config and record its source.
macro_rules! merge {
    ($attr:expr, $src:expr, $key:literal, $target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = v;
            $attr.insert($key.to_string(), $src.clone());
        }
    };
}

/// Same as `merge!` for fields that stay optional after resolution.
macro_rules! merge_opt {
    ($attr:expr, $src:expr, $key:literal, $target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = Some(v);
            $attr.insert($key.to_string(), $src.clone());
        }
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover configuration starting from a specific directory.
    ///
    /// Path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut config = Config::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(shipwright_utils::error::ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            config.apply_file(file_config, ConfigSource::ConfigFile(path.clone()));
            config.config_path = Some(path.clone());
        }

        if let Some(verbose) = cli_args.verbose {
            config.defaults.verbose = verbose;
            config
                .source_attribution
                .insert("defaults.verbose".to_string(), ConfigSource::Cli);
        }
        if let Some(prefer_secondary) = cli_args.prefer_secondary {
            config.llm.prefer_secondary = prefer_secondary;
            config
                .source_attribution
                .insert("llm.prefer_secondary".to_string(), ConfigSource::Cli);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: TomlConfig, src: ConfigSource) {
        let attr: &mut BTreeMap<String, ConfigSource> = &mut self.source_attribution;

        if let Some(d) = file.defaults {
            merge!(attr, src, "defaults.verbose", self.defaults.verbose, d.verbose);
            merge!(attr, src, "defaults.base_branch", self.defaults.base_branch, d.base_branch);
            merge!(attr, src, "defaults.branch_prefix", self.defaults.branch_prefix, d.branch_prefix);
        }

        if let Some(l) = file.llm {
            merge!(attr, src, "llm.prefer_secondary", self.llm.prefer_secondary, l.prefer_secondary);
            merge!(attr, src, "llm.timeout_secs", self.llm.timeout_secs, l.timeout_secs);
            merge!(attr, src, "llm.max_calls_per_run", self.llm.max_calls_per_run, l.max_calls_per_run);

            if let Some(p) = l.primary {
                let t = &mut self.llm.primary;
                merge!(attr, src, "llm.primary.api_key_env", t.api_key_env, p.api_key_env);
                merge!(attr, src, "llm.primary.base_url", t.base_url, p.base_url);
                merge!(attr, src, "llm.primary.model", t.model, p.model);
                merge!(attr, src, "llm.primary.max_tokens", t.max_tokens, p.max_tokens);
                merge!(attr, src, "llm.primary.temperature", t.temperature, p.temperature);
                merge!(attr, src, "llm.primary.input_usd_per_mtok", t.input_usd_per_mtok, p.input_usd_per_mtok);
                merge!(attr, src, "llm.primary.output_usd_per_mtok", t.output_usd_per_mtok, p.output_usd_per_mtok);
            }

            if let Some(s) = l.secondary {
                let t = &mut self.llm.secondary;
                merge!(attr, src, "llm.secondary.base_url", t.base_url, s.base_url);
                merge!(attr, src, "llm.secondary.model", t.model, s.model);
                merge!(attr, src, "llm.secondary.input_usd_per_mtok", t.input_usd_per_mtok, s.input_usd_per_mtok);
                merge!(attr, src, "llm.secondary.output_usd_per_mtok", t.output_usd_per_mtok, s.output_usd_per_mtok);
            }
        }

        if let Some(b) = file.budget {
            let t = &mut self.budget;
            merge!(attr, src, "budget.daily_cap_usd", t.daily_cap_usd, b.daily_cap_usd);
            merge!(attr, src, "budget.warn_ratio", t.warn_ratio, b.warn_ratio);
            merge!(attr, src, "budget.browser_minute_usd", t.browser_minute_usd, b.browser_minute_usd);
            merge!(attr, src, "budget.snapshot_usd", t.snapshot_usd, b.snapshot_usd);
            merge_opt!(attr, src, "budget.notify_webhook_env", t.notify_webhook_env, b.notify_webhook_env);
        }

        if let Some(p) = file.pipeline {
            let t = &mut self.pipeline;
            merge!(attr, src, "pipeline.ci_timeout_secs", t.ci_timeout_secs, p.ci_timeout_secs);
            merge!(attr, src, "pipeline.ci_poll_interval_secs", t.ci_poll_interval_secs, p.ci_poll_interval_secs);
            merge!(attr, src, "pipeline.preview_timeout_secs", t.preview_timeout_secs, p.preview_timeout_secs);
            merge!(attr, src, "pipeline.preview_poll_interval_secs", t.preview_poll_interval_secs, p.preview_poll_interval_secs);
        }

        if let Some(g) = file.github {
            let t = &mut self.github;
            merge_opt!(attr, src, "github.repo", t.repo, g.repo);
            merge!(attr, src, "github.token_env", t.token_env, g.token_env);
            merge!(attr, src, "github.api_base", t.api_base, g.api_base);
        }

        if let Some(v) = file.visual {
            let t = &mut self.visual;
            merge_opt!(attr, src, "visual.command", t.command, v.command);
            merge_opt!(attr, src, "visual.token_env", t.token_env, v.token_env);
        }
    }

    /// Walk upward from `start_dir` looking for `.shipwright/config.toml`.
    ///
    /// Stops at the filesystem root or at a repository root marker.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(".shipwright").join("config.toml");
            if config_path.is_file() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: TomlConfig = toml::from_str(&content).map_err(|e| {
                    shipwright_utils::error::ConfigError::InvalidFile(format!(
                        "{}: {e}",
                        path.display()
                    ))
                })?;
                Ok(config)
            }
            // Missing config file is OK: defaults apply
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(".shipwright");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();

        assert!(config.config_path.is_none());
        assert_eq!(config.budget.daily_cap_usd, 5.0);
        assert_eq!(config.pipeline.ci_timeout_secs, 900);
        assert_eq!(config.llm.timeout_secs, 60);
        assert!(!config.llm.prefer_secondary);
        assert_eq!(config.source_of("budget.daily_cap_usd"), ConfigSource::Defaults);
    }

    #[test]
    fn test_discovers_file_in_parent_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let path = write_config(
            temp.path(),
            "[budget]\ndaily_cap_usd = 12.5\n\n[github]\nrepo = \"acme/shop\"\n",
        );
        let nested = temp.path().join("apps").join("web");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();

        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.budget.daily_cap_usd, 12.5);
        assert_eq!(config.github.repo.as_deref(), Some("acme/shop"));
        assert_eq!(
            config.source_of("budget.daily_cap_usd"),
            ConfigSource::ConfigFile(path)
        );
        assert_eq!(config.source_of("budget.warn_ratio"), ConfigSource::Defaults);
    }

    #[test]
    fn test_discovery_stops_at_repo_root() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[budget]\ndaily_cap_usd = 1.0\n");
        let repo = temp.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        let found = Config::discover_config_file_from(&repo).unwrap();

        assert!(found.is_none());
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[llm]\nprefer_secondary = false\n");

        let cli = CliArgs {
            prefer_secondary: Some(true),
            verbose: Some(true),
            ..CliArgs::default()
        };
        let config = Config::discover_from(temp.path(), &cli).unwrap();

        assert!(config.llm.prefer_secondary);
        assert!(config.defaults.verbose);
        assert_eq!(config.source_of("llm.prefer_secondary"), ConfigSource::Cli);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let temp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };

        let err = Config::discover_from(temp.path(), &cli).unwrap_err();

        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[budget]\ndaily_cap = 5.0\n");

        let result = Config::discover_from(temp.path(), &CliArgs::default());

        assert!(result.is_err());
    }

    #[test]
    fn test_nested_provider_sections() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
[llm.primary]
model = "claude-opus-4"
output_usd_per_mtok = 75.0

[llm.secondary]
base_url = "http://gpu-box:11434/api/generate"
"#,
        );

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();

        assert_eq!(config.llm.primary.model, "claude-opus-4");
        assert_eq!(config.llm.primary.output_usd_per_mtok, 75.0);
        assert_eq!(config.llm.primary.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.llm.secondary.base_url, "http://gpu-box:11434/api/generate");
    }
}
