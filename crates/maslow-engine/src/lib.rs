//! maslow-engine: the agent orchestration engine.
//!
//! The engine turns task briefs into kanban cards and dispatches background
//! coding agents against them inside isolated git worktrees. Everything
//! external (storage, chat, model, voice) arrives as a capability trait from
//! `maslow-core`; this crate owns the runtime behavior:
//!
//! - [`heartbeat`] - the periodic scheduler and startup reconciler
//! - [`runner`] - per-card agent supervision and teardown
//! - [`registry`] - concurrency caps and the live-agent table
//! - [`worktree`] - branch-scoped worktree lifecycle
//! - [`session`] - the conversational dispatcher and handoff protocol

pub mod context;
pub mod engine;
pub mod heartbeat;
pub mod registry;
pub mod runner;
pub mod session;
pub mod subprocess;
pub mod worktree;

pub use context::Collaborators;
pub use engine::{Engine, EngineOptions};
pub use heartbeat::{Heartbeat, HeartbeatConstraints, HeartbeatError, SubmitOptions};
pub use registry::{AgentProcessSnapshot, AgentRegistry, CapacityError};
pub use runner::{AgentRunner, RunnerError, SpawnAgentRequest};
pub use session::{SessionManager, SessionPolicy};
pub use subprocess::TokioSubprocess;
pub use worktree::{WorktreeError, WorktreeHandle, WorktreeManager};
