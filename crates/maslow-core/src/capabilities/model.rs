use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Token accounting reported by the conversational model at the end of a
/// turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// The model's context window in tokens. Implementations that cannot
    /// report it should use their model's published native window.
    pub context_window: u64,
}

impl ModelUsage {
    /// Context usage as a percentage in `[0, 100]`.
    pub fn percent_used(&self) -> f64 {
        if self.context_window == 0 {
            return 0.0;
        }
        let used = (self.input_tokens + self.output_tokens) as f64;
        (used / self.context_window as f64 * 100.0).min(100.0)
    }
}

/// One event on a conversational model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Assistant text. `session_id`, when present, identifies the model
    /// session this turn runs in and must be persisted for resumption.
    Text {
        session_id: Option<String>,
        content: String,
    },
    ToolCall {
        name: String,
        summary: String,
    },
    ToolResult {
        name: String,
        summary: String,
    },
    Error {
        message: String,
    },
    /// End-of-turn marker carrying token usage.
    Result {
        usage: ModelUsage,
    },
}

/// A request to the conversational model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub cwd: PathBuf,
    /// Resume an existing model session instead of starting fresh.
    pub resume_session_id: Option<String>,
    pub images: Vec<Vec<u8>>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            prompt: prompt.into(),
            cwd,
            resume_session_id: None,
            images: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model stream error: {message}")]
    Stream { message: String },

    #[error("Handoff generation failed (exit {code})")]
    HandoffFailed { code: i32 },

    #[error("Model backend error: {message}")]
    Backend { message: String },
}

/// The conversational model used for operator chat and handoff summaries.
#[async_trait]
pub trait ConversationalModel: Send + Sync {
    /// Start a turn. Events arrive on the returned channel until the stream
    /// ends; a well-behaved implementation terminates with a
    /// [`ModelEvent::Result`].
    async fn send_message(&self, req: ModelRequest)
    -> Result<mpsc::Receiver<ModelEvent>, ModelError>;

    /// Resume `session_id` with a one-turn ceiling and ask it to emit a
    /// handoff summary of the conversation so far.
    async fn generate_handoff(&self, session_id: &str, cwd: &Path) -> Result<String, ModelError>;
}
