//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default Ollama API host.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Default Ollama model used when the operator enables the ollama agent
/// without naming one.
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder";

/// Default number of connect retries against the Ollama host.
pub const DEFAULT_OLLAMA_MAX_RETRIES: u32 = 3;

/// Top-level Maslow configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaslowConfig {
    pub telegram: TelegramConfig,
    pub anthropic: AnthropicConfig,
    pub workspace: WorkspaceConfig,
    pub database: DatabaseConfig,
    pub ollama: Option<OllamaConfig>,
}

/// Telegram bridge credentials: the bot token and the single operator's
/// numeric user id. Messages from any other user are dropped by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub user_id: i64,
}

/// Credentials for the conversational model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub api_key: String,
}

/// Workspace root: the directory containing the operator's repository and
/// the `HEARTBEAT.md` constraints document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub path: PathBuf,
}

/// Location of the storage layer's database file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Optional Ollama settings for the library-mediated local agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            max_retries: DEFAULT_OLLAMA_MAX_RETRIES,
        }
    }
}
