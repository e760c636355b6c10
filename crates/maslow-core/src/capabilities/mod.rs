//! Capability contracts consumed by the orchestration engine.
//!
//! Every external collaborator (storage, conversational model, chat bridge,
//! voice, subprocess host) appears here as an object-safe async trait. The
//! engine is constructor-injected with `Arc<dyn Trait>` implementations;
//! there is no process-wide service locator.

mod chat;
mod chats;
mod errors;
mod kanban;
mod model;
mod projects;
mod skills;
mod steering;
mod subprocess;
mod thinking;
mod voice;

pub use chat::{ChatAdapter, ChatError, IncomingMessage};
pub use chats::ChatSessionStore;
pub use errors::StoreError;
pub use kanban::KanbanStore;
pub use model::{ConversationalModel, ModelError, ModelEvent, ModelRequest, ModelUsage};
pub use projects::ProjectStore;
pub use skills::{SkillProvider, SkillRef};
pub use steering::SteeringProvider;
pub use subprocess::{ChildProcess, SpawnError, SpawnSpec, Subprocess};
pub use thinking::ThinkingPartner;
pub use voice::{VoiceAvailability, VoiceError, VoiceGateway};
