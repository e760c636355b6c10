//! Configuration loading and merging.
//!
//! Configuration is loaded in the following order (later sources override
//! earlier ones):
//! 1. Hardcoded defaults
//! 2. User config: `~/.maslow/config.toml`
//! 3. Project config: `./.maslow/config.toml`
//!
//! Missing files are not errors; parse and validation failures are.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::ConfigError;
use crate::types::MaslowConfig;
use crate::validation::validate_config;

/// Directory name holding Maslow config files, both under `$HOME` and under
/// the current project.
const CONFIG_DIR: &str = ".maslow";

/// Config file name inside [`CONFIG_DIR`].
const CONFIG_FILE: &str = "config.toml";

/// Load configuration from the hierarchy of config files.
pub fn load_hierarchy() -> Result<MaslowConfig, ConfigError> {
    let mut config = MaslowConfig::default();

    if let Some(user_path) = user_config_path() {
        match load_config_file(&user_path) {
            Ok(Some(user_config)) => config = merge_configs(config, user_config),
            Ok(None) => debug!(event = "config.user_config_absent", path = %user_path.display()),
            Err(e) => return Err(e),
        }
    }

    let project_path = project_config_path()?;
    match load_config_file(&project_path) {
        Ok(Some(project_config)) => config = merge_configs(config, project_config),
        Ok(None) => debug!(event = "config.project_config_absent", path = %project_path.display()),
        Err(e) => return Err(e),
    }

    expand_workspace_home(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load a single configuration file. Returns `Ok(None)` when the file does
/// not exist.
pub fn load_config_file(path: &Path) -> Result<Option<MaslowConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let config: MaslowConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(config))
}

/// Merge two configurations, with `override_config` taking precedence.
///
/// Scalar fields replace the base value only when the override carries a
/// non-default value; the optional ollama table replaces wholesale.
pub fn merge_configs(base: MaslowConfig, override_config: MaslowConfig) -> MaslowConfig {
    let mut merged = base;

    if !override_config.telegram.bot_token.is_empty() {
        merged.telegram.bot_token = override_config.telegram.bot_token;
    }
    if override_config.telegram.user_id != 0 {
        merged.telegram.user_id = override_config.telegram.user_id;
    }
    if !override_config.anthropic.api_key.is_empty() {
        merged.anthropic.api_key = override_config.anthropic.api_key;
    }
    if !override_config.workspace.path.as_os_str().is_empty() {
        merged.workspace.path = override_config.workspace.path;
    }
    if !override_config.database.path.as_os_str().is_empty() {
        merged.database.path = override_config.database.path;
    }
    if override_config.ollama.is_some() {
        merged.ollama = override_config.ollama;
    }

    merged
}

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn project_config_path() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Expand a leading `~` in `workspace.path` so hosts can write portable
/// config files.
fn expand_workspace_home(config: &mut MaslowConfig) {
    let Some(path_str) = config.workspace.path.to_str() else {
        return;
    };
    if let Some(rest) = path_str.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        config.workspace.path = home.join(rest);
    }
}
