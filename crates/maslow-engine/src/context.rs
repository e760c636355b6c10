//! Constructor-injected collaborator bundle.

use std::path::PathBuf;
use std::sync::Arc;

use maslow_core::capabilities::{
    ChatAdapter, ChatSessionStore, ConversationalModel, KanbanStore, ProjectStore, SkillProvider,
    SteeringProvider, Subprocess, ThinkingPartner, VoiceGateway,
};
use maslow_core::clock::Clock;
use maslow_core::events::BroadcastBus;

/// Everything the engine consumes from the outside world, bundled once at
/// construction. There is no process-wide service locator; components hold
/// an `Arc<Collaborators>` and nothing else.
#[derive(Clone)]
pub struct Collaborators {
    pub projects: Arc<dyn ProjectStore>,
    pub kanban: Arc<dyn KanbanStore>,
    pub chats: Arc<dyn ChatSessionStore>,
    pub model: Arc<dyn ConversationalModel>,
    pub chat: Arc<dyn ChatAdapter>,
    pub voice: Arc<dyn VoiceGateway>,
    pub steering: Arc<dyn SteeringProvider>,
    pub skills: Arc<dyn SkillProvider>,
    pub thinking: Arc<dyn ThinkingPartner>,
    pub subprocess: Arc<dyn Subprocess>,
    pub clock: Arc<dyn Clock>,
    pub bus: BroadcastBus,
    /// The operator's workspace root: where `HEARTBEAT.md` lives and where
    /// conversational sessions run.
    pub workspace_dir: PathBuf,
}
