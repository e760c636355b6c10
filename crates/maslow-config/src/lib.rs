//! maslow-config: process-level configuration for the Maslow assistant.
//!
//! Configuration is plain TOML loaded from a small hierarchy (defaults,
//! then `~/.maslow/config.toml`, then `./.maslow/config.toml`) and validated
//! before the rest of the system sees it.

mod errors;
mod loading;
mod types;
mod validation;

pub use errors::ConfigError;
pub use loading::{load_config_file, load_hierarchy, merge_configs};
pub use types::{
    AnthropicConfig, DatabaseConfig, MaslowConfig, OllamaConfig, TelegramConfig, WorkspaceConfig,
};
pub use validation::validate_config;
