//! Configuration for shipwright: model, discovery, and validation.

pub mod config;

pub use config::{
    BudgetConfig, CliArgs, Config, ConfigSource, Defaults, GithubConfig, LlmConfig,
    PipelineConfig, PrimaryProviderConfig, SecondaryProviderConfig, VisualConfig,
};
