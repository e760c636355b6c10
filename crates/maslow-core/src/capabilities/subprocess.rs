use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// What to launch and how.
///
/// `env_remove` names variables to scrub from the inherited environment
/// before the child starts. The agent runner uses it to keep the
/// conversational model's credential out of sub-agent processes.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd,
            env: Vec::new(),
            env_remove: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env_remove(mut self, name: impl Into<String>) -> Self {
        self.env_remove.push(name.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Program '{program}' not found in PATH")]
    ProgramMissing { program: String },

    #[error("Failed to launch '{program}': {message}")]
    LaunchFailed { program: String, message: String },

    #[error("Process wait failed: {message}")]
    WaitFailed { message: String },
}

/// A spawned child, decoupled from the host's process type.
///
/// Output and exit arrive on channels fed by host-owned pump tasks, so the
/// supervisor can select over them while still being able to signal the
/// child. `take_output`/`take_exit` hand over the receiving halves exactly
/// once.
pub trait ChildProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Merged stdout + stderr, one line per message. `None` after the first
    /// call.
    fn take_output(&mut self) -> Option<mpsc::Receiver<String>>;

    /// Exit code (killed-by-signal is reported as a negative code). `None`
    /// after the first call.
    fn take_exit(&mut self) -> Option<oneshot::Receiver<i32>>;

    /// Ask the child to stop gracefully (SIGTERM or equivalent).
    fn terminate(&self);

    /// Force-kill the child (SIGKILL or equivalent).
    fn kill(&self);
}

/// Subprocess host: spawn with piped stdio.
#[async_trait]
pub trait Subprocess: Send + Sync {
    async fn spawn(&self, spec: SpawnSpec) -> Result<Box<dyn ChildProcess>, SpawnError>;
}
