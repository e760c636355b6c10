//! Configuration validation.
//!
//! Validation runs after the hierarchy merge, so messages always describe
//! the effective configuration the process would run with.

use crate::errors::ConfigError;
use crate::types::MaslowConfig;

/// Validate a merged configuration, returning an error if any values are
/// unusable.
pub fn validate_config(config: &MaslowConfig) -> Result<(), ConfigError> {
    if config.telegram.bot_token.trim().is_empty() {
        return Err(invalid("telegram.bot_token must not be empty"));
    }
    if config.telegram.user_id <= 0 {
        return Err(invalid("telegram.user_id must be a positive Telegram user id"));
    }
    if config.anthropic.api_key.trim().is_empty() {
        return Err(invalid("anthropic.api_key must not be empty"));
    }
    if config.workspace.path.as_os_str().is_empty() {
        return Err(invalid("workspace.path must point at the operator's workspace"));
    }
    if config.database.path.as_os_str().is_empty() {
        return Err(invalid("database.path must point at the storage database file"));
    }

    if let Some(ollama) = &config.ollama {
        if !ollama.host.starts_with("http://") && !ollama.host.starts_with("https://") {
            return Err(invalid(&format!(
                "ollama.host '{}' must be an http(s) URL",
                ollama.host
            )));
        }
        if ollama.model.trim().is_empty() {
            return Err(invalid("ollama.model must not be empty"));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}
