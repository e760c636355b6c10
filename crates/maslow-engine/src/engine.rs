//! Engine assembly.

use std::path::PathBuf;
use std::sync::Arc;

use maslow_config::OllamaConfig;
use tracing::info;

use crate::context::Collaborators;
use crate::heartbeat::Heartbeat;
use crate::registry::{AgentRegistry, DEFAULT_MAX_CONCURRENT_AGENTS};
use crate::runner::AgentRunner;
use crate::session::{SessionManager, SessionPolicy};
use crate::worktree::WorktreeManager;

/// Construction-time options the host resolves from its config.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Root of the repository agents work in. Worktrees land under
    /// `<repo_root>/.worktrees/`.
    pub repo_root: PathBuf,
    pub ollama: Option<OllamaConfig>,
    pub session_policy: SessionPolicy,
}

/// The assembled orchestration engine.
///
/// Hosts construct one `Engine` per process, `start()` it, feed chat
/// messages into `sessions`, and `shutdown()` on exit.
pub struct Engine {
    pub heartbeat: Heartbeat,
    pub sessions: Arc<SessionManager>,
    pub runner: Arc<AgentRunner>,
    pub registry: Arc<AgentRegistry>,
    pub worktrees: Arc<WorktreeManager>,
}

impl Engine {
    pub fn new(ctx: Collaborators, options: EngineOptions) -> Self {
        let ctx = Arc::new(ctx);
        let registry = Arc::new(AgentRegistry::new(
            DEFAULT_MAX_CONCURRENT_AGENTS,
            Arc::clone(&ctx.clock),
        ));
        let worktrees = Arc::new(WorktreeManager::new(
            options.repo_root,
            Arc::clone(&ctx.subprocess),
        ));
        let runner = Arc::new(AgentRunner::new(
            Arc::clone(&ctx),
            Arc::clone(&registry),
            Arc::clone(&worktrees),
            options.ollama,
        ));
        let heartbeat = Heartbeat::new(
            Arc::clone(&ctx),
            Arc::clone(&registry),
            Arc::clone(&runner),
            Arc::clone(&worktrees),
        );
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&ctx),
            heartbeat.clone(),
            options.session_policy,
        ));

        Self {
            heartbeat,
            sessions,
            runner,
            registry,
            worktrees,
        }
    }

    /// Reconcile, tick once, and install the periodic schedule.
    pub async fn start(&self) {
        self.heartbeat.start().await;
    }

    /// Stop the schedule and cancel every live agent. Idempotent.
    pub async fn shutdown(&self) {
        info!(event = "engine.shutdown_started");
        self.heartbeat.stop().await;
        self.runner.shutdown_all().await;
        info!(event = "engine.shutdown_completed");
    }
}
