//! maslow-core: domain model and contracts for the Maslow orchestration engine.
//!
//! This crate owns everything the engine and its hosts agree on:
//!
//! - [`model`] - projects, cards, chat sessions, agent kinds
//! - [`capabilities`] - the collaborator contracts the engine consumes
//!   (kanban, stores, conversational model, chat adapter, voice, subprocess)
//! - [`events`] - the broadcast event model and fanout bus
//! - [`clock`] - monotonic + wall clock abstraction
//! - [`prompt`] - pure prompt assembly for build agents

pub mod capabilities;
pub mod clock;
pub mod events;
pub mod logging;
pub mod model;
pub mod prompt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use capabilities::{
    ChatAdapter, ChatError, ChatSessionStore, ChildProcess, ConversationalModel, IncomingMessage,
    KanbanStore, ModelError, ModelEvent, ModelRequest, ModelUsage, ProjectStore, SkillProvider,
    SkillRef, SpawnError, SpawnSpec, SteeringProvider, StoreError, Subprocess, ThinkingPartner,
    VoiceAvailability, VoiceError, VoiceGateway,
};
pub use clock::{Clock, SystemClock};
pub use events::{BroadcastBus, BroadcastEvent};
pub use logging::init_logging;
pub use model::{AgentKind, AgentStatus, Card, ChatSession, Column, Project, ProjectStatus};
