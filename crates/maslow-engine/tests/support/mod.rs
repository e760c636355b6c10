//! Shared harness for engine scenario tests: the engine wired to in-memory
//! collaborator doubles, a scripted subprocess host, and a hand-driven
//! clock.

// Each test binary uses a different subset of the harness.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use maslow_core::events::{BroadcastBus, BroadcastEvent};
use maslow_core::model::Project;
use maslow_core::test_support::{
    ManualClock, MemoryChats, MemoryKanban, MemoryProjects, RecordingChat, RecordingThinking,
    ScriptedModel, StaticSkills, StaticSteering, StaticVoice,
};
use maslow_engine::session::SessionPolicy;
use maslow_engine::{Collaborators, Engine, EngineOptions};

pub struct Harness {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub kanban: Arc<MemoryKanban>,
    pub chats: Arc<MemoryChats>,
    pub model: Arc<ScriptedModel>,
    pub chat: Arc<RecordingChat>,
    pub subprocess: Arc<maslow_core::test_support::FakeSubprocess>,
    pub thinking: Arc<RecordingThinking>,
    pub bus: BroadcastBus,
    pub workspace: TempDir,
}

pub fn harness(projects: Vec<Project>) -> Harness {
    harness_with(projects, StaticVoice::transcribing("transcribed"), SessionPolicy::default())
}

pub fn harness_with(
    projects: Vec<Project>,
    voice: StaticVoice,
    session_policy: SessionPolicy,
) -> Harness {
    let workspace = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::new());
    let kanban = Arc::new(MemoryKanban::new(clock.clone()));
    let chats = Arc::new(MemoryChats::new(clock.clone()));
    let model = Arc::new(ScriptedModel::new());
    let chat = Arc::new(RecordingChat::new());
    let thinking = Arc::new(RecordingThinking::new());
    let subprocess = Arc::new(maslow_core::test_support::FakeSubprocess::new());
    let bus = BroadcastBus::new();

    let ctx = Collaborators {
        projects: Arc::new(MemoryProjects::new(projects)),
        kanban: kanban.clone(),
        chats: chats.clone(),
        model: model.clone(),
        chat: chat.clone(),
        voice: Arc::new(voice),
        steering: Arc::new(StaticSteering::empty()),
        skills: Arc::new(StaticSkills::none()),
        thinking: thinking.clone(),
        subprocess: subprocess.clone(),
        clock: clock.clone(),
        bus: bus.clone(),
        workspace_dir: workspace.path().to_path_buf(),
    };
    let engine = Engine::new(
        ctx,
        EngineOptions {
            repo_root: workspace.path().to_path_buf(),
            ollama: None,
            session_policy,
        },
    );

    Harness {
        engine,
        clock,
        kanban,
        chats,
        model,
        chat,
        subprocess,
        thinking,
        bus,
        workspace,
    }
}

/// Drain everything currently buffered on a bus subscription.
pub fn drain_events(rx: &mut broadcast::Receiver<BroadcastEvent>) -> Vec<BroadcastEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[BroadcastEvent]) -> Vec<&'static str> {
    events.iter().map(BroadcastEvent::kind).collect()
}

/// Poll until `cond` holds; panics after ~2 seconds. Supervisor tasks run
/// concurrently with the test body, so terminal assertions wait here.
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
