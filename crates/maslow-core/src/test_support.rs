//! In-memory collaborator doubles for engine tests.
//!
//! Everything here is deliberately simple: state in a mutex, recorded calls
//! in vectors, time driven by hand through [`ManualClock`].

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::capabilities::{
    ChatAdapter, ChatError, ChatSessionStore, ChildProcess, ConversationalModel, KanbanStore,
    ModelError, ModelEvent, ModelRequest, ProjectStore, SkillProvider, SkillRef, SpawnError,
    SpawnSpec, SteeringProvider, StoreError, Subprocess, ThinkingPartner, VoiceAvailability,
    VoiceError, VoiceGateway,
};
use crate::clock::Clock;
use crate::model::{
    AgentKind, AgentStatus, Card, ChatSession, Column, Project, ProjectStatus,
};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Hand-driven clock. Monotonic time starts at zero; wall time starts at a
/// fixed epoch so card timestamps are stable across runs.
pub struct ManualClock {
    state: Mutex<(u64, DateTime<Utc>)>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        Self {
            state: Mutex::new((0, start)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        let mut state = self.state.lock().unwrap();
        state.0 += ms;
        state.1 += Duration::milliseconds(ms as i64);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance_ms((minutes * 60_000) as u64);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.state.lock().unwrap().0
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().1
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Build an active project fixture.
pub fn project_fixture(id: &str, name: &str) -> Project {
    Project {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        status: ProjectStatus::Active,
        agent_timeout_minutes: None,
        max_concurrent_agents: None,
    }
}

/// Build a backlog card fixture.
pub fn card_fixture(id: &str, project_id: &str, title: &str, now: DateTime<Utc>) -> Card {
    Card {
        id: id.to_string(),
        project_id: project_id.to_string(),
        title: title.to_string(),
        description: format!("{title} (description)"),
        column: Column::Backlog,
        position: 0,
        priority: 0,
        context_snapshot: None,
        last_session_id: None,
        assigned_agent: None,
        agent_status: None,
        blocked_reason: None,
        branch_name: None,
        started_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Kanban store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct KanbanInner {
    cards: HashMap<String, Card>,
    next_position: i64,
    next_id: u64,
}

/// In-memory kanban board with recorded `skip_to_back` calls.
pub struct MemoryKanban {
    clock: Arc<dyn Clock>,
    inner: Mutex<KanbanInner>,
    pub skip_to_back_calls: Mutex<Vec<String>>,
}

impl MemoryKanban {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(KanbanInner::default()),
            skip_to_back_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, card: Card) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_position = inner.next_position.max(card.position + 1);
        inner.cards.insert(card.id.clone(), card);
    }

    pub fn card(&self, card_id: &str) -> Option<Card> {
        self.inner.lock().unwrap().cards.get(card_id).cloned()
    }

    pub fn card_by_title(&self, title: &str) -> Option<Card> {
        self.inner
            .lock()
            .unwrap()
            .cards
            .values()
            .find(|c| c.title == title)
            .cloned()
    }

    pub fn all_cards(&self) -> Vec<Card> {
        self.inner.lock().unwrap().cards.values().cloned().collect()
    }

    pub fn skipped(&self) -> Vec<String> {
        self.skip_to_back_calls.lock().unwrap().clone()
    }

    fn with_card<R>(
        &self,
        card_id: &str,
        f: impl FnOnce(&mut Card) -> R,
    ) -> Result<R, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let card = inner
            .cards
            .get_mut(card_id)
            .ok_or_else(|| StoreError::CardNotFound {
                card_id: card_id.to_string(),
            })?;
        Ok(f(card))
    }
}

#[async_trait]
impl KanbanStore for MemoryKanban {
    async fn get_board(&self, project_id: &str) -> Result<Vec<Card>, StoreError> {
        let mut cards: Vec<Card> = self
            .inner
            .lock()
            .unwrap()
            .cards
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.schedule_key());
        Ok(cards)
    }

    async fn get_next(&self, project_id: &str) -> Result<Option<Card>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .cards
            .values()
            .filter(|c| c.project_id == project_id && c.column == Column::Backlog)
            .min_by_key(|c| c.schedule_key())
            .cloned())
    }

    async fn create_card(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        column: Column,
    ) -> Result<Card, StoreError> {
        let now = self.clock.now_utc();
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let position = inner.next_position;
        inner.next_position += 1;
        let card = Card {
            id: format!("card-{}", inner.next_id),
            project_id: project_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            column,
            position,
            priority: 0,
            context_snapshot: None,
            last_session_id: None,
            assigned_agent: None,
            agent_status: None,
            blocked_reason: None,
            branch_name: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.cards.insert(card.id.clone(), card.clone());
        Ok(card)
    }

    async fn update_card(&self, card: &Card) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.cards.contains_key(&card.id) {
            return Err(StoreError::CardNotFound {
                card_id: card.id.clone(),
            });
        }
        inner.cards.insert(card.id.clone(), card.clone());
        Ok(())
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().cards.remove(card_id);
        Ok(())
    }

    async fn move_card(&self, card_id: &str, column: Column) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        self.with_card(card_id, |card| {
            card.column = column;
            card.updated_at = now;
        })
    }

    async fn skip_to_back(&self, card_id: &str) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        let next_position = {
            let mut inner = self.inner.lock().unwrap();
            let position = inner.next_position;
            inner.next_position += 1;
            position
        };
        self.with_card(card_id, |card| {
            card.column = Column::Backlog;
            card.agent_status = Some(AgentStatus::Idle);
            card.blocked_reason = None;
            card.position = next_position;
            card.updated_at = now;
        })?;
        self.skip_to_back_calls
            .lock()
            .unwrap()
            .push(card_id.to_string());
        Ok(())
    }

    async fn save_context(
        &self,
        card_id: &str,
        snapshot: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        self.with_card(card_id, |card| {
            card.context_snapshot = Some(snapshot.to_string());
            card.last_session_id = Some(session_id.to_string());
            card.updated_at = now;
        })
    }

    async fn resume(&self, card_id: &str) -> Result<Option<String>, StoreError> {
        self.with_card(card_id, |card| card.context_snapshot.clone())
    }

    async fn assign_agent(&self, card_id: &str, agent: AgentKind) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        self.with_card(card_id, |card| {
            card.assigned_agent = Some(agent);
            card.updated_at = now;
        })
    }

    async fn update_agent_status(
        &self,
        card_id: &str,
        status: AgentStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        self.with_card(card_id, |card| {
            card.agent_status = Some(status);
            card.blocked_reason = reason.map(str::to_string);
            card.updated_at = now;
        })
    }

    async fn start_work(&self, card_id: &str, agent: AgentKind) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        self.with_card(card_id, |card| {
            card.column = Column::InProgress;
            card.agent_status = Some(AgentStatus::Running);
            card.assigned_agent = Some(agent);
            card.started_at = Some(now);
            card.updated_at = now;
        })
    }

    async fn complete_work(&self, card_id: &str) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        self.with_card(card_id, |card| {
            card.column = Column::Done;
            card.agent_status = Some(AgentStatus::Completed);
            card.completed_at = Some(now);
            card.updated_at = now;
        })
    }

    async fn cards_awaiting_synthesis(&self) -> Result<Vec<Card>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .cards
            .values()
            .filter(|c| c.column == Column::Review)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Project store
// ---------------------------------------------------------------------------

pub struct MemoryProjects {
    projects: Mutex<Vec<Project>>,
}

impl MemoryProjects {
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects: Mutex::new(projects),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ProjectStore for MemoryProjects {
    async fn get_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == project_id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Chat session store
// ---------------------------------------------------------------------------

pub struct MemoryChats {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, ChatSession>>,
    pub deleted: Mutex<Vec<String>>,
    pub usage_updates: Mutex<Vec<(String, f64)>>,
}

impl MemoryChats {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            usage_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, session: ChatSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.chat_id.clone(), session);
    }

    pub fn session(&self, chat_id: &str) -> Option<ChatSession> {
        self.sessions.lock().unwrap().get(chat_id).cloned()
    }
}

#[async_trait]
impl ChatSessionStore for MemoryChats {
    async fn get_session(&self, chat_id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(chat_id).cloned())
    }

    async fn save_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        self.insert(session.clone());
        Ok(())
    }

    async fn update_last_active(&self, chat_id: &str) -> Result<(), StoreError> {
        let now = self.clock.now_utc();
        if let Some(session) = self.sessions.lock().unwrap().get_mut(chat_id) {
            session.last_active_at = now;
        }
        Ok(())
    }

    async fn update_context_usage(&self, chat_id: &str, percent: f64) -> Result<(), StoreError> {
        self.usage_updates
            .lock()
            .unwrap()
            .push((chat_id.to_string(), percent));
        if let Some(session) = self.sessions.lock().unwrap().get_mut(chat_id) {
            session.context_usage_percent = percent;
        }
        Ok(())
    }

    async fn delete_session(&self, chat_id: &str) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().remove(chat_id);
        self.deleted.lock().unwrap().push(chat_id.to_string());
        Ok(())
    }

    async fn get_last_active_chat_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .max_by_key(|s| s.last_active_at)
            .map(|s| s.chat_id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Conversational model
// ---------------------------------------------------------------------------

/// Scripted model: each `send_message` call pops the next pre-programmed
/// turn and streams its events.
pub struct ScriptedModel {
    turns: Mutex<VecDeque<Vec<ModelEvent>>>,
    pub requests: Mutex<Vec<ModelRequest>>,
    pub handoff_calls: Mutex<Vec<String>>,
    handoff_summary: Mutex<String>,
    fail_handoff: AtomicBool,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            handoff_calls: Mutex::new(Vec::new()),
            handoff_summary: Mutex::new("the work so far, summarized".to_string()),
            fail_handoff: AtomicBool::new(false),
        }
    }

    pub fn push_turn(&self, events: Vec<ModelEvent>) {
        self.turns.lock().unwrap().push_back(events);
    }

    pub fn set_handoff_summary(&self, summary: &str) {
        *self.handoff_summary.lock().unwrap() = summary.to_string();
    }

    pub fn fail_handoff(&self) {
        self.fail_handoff.store(true, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ModelRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationalModel for ScriptedModel {
    async fn send_message(
        &self,
        req: ModelRequest,
    ) -> Result<mpsc::Receiver<ModelEvent>, ModelError> {
        self.requests.lock().unwrap().push(req);
        let events = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Ok(rx)
    }

    async fn generate_handoff(&self, session_id: &str, _cwd: &Path) -> Result<String, ModelError> {
        if self.fail_handoff.load(Ordering::SeqCst) {
            return Err(ModelError::HandoffFailed { code: 1 });
        }
        self.handoff_calls
            .lock()
            .unwrap()
            .push(session_id.to_string());
        Ok(self.handoff_summary.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Chat adapter
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingChat {
    pub sent: Mutex<Vec<(String, String)>>,
    pub voice_notes: Mutex<Vec<(String, Vec<u8>)>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
    }

    pub fn texts_for(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn any_text_contains(&self, needle: &str) -> bool {
        self.sent.lock().unwrap().iter().any(|(_, t)| t.contains(needle))
    }
}

#[async_trait]
impl ChatAdapter for RecordingChat {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, _chat_id: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn edit_message(
        &self,
        _chat_id: &str,
        _message_id: i64,
        _text: &str,
    ) -> Result<(), ChatError> {
        Ok(())
    }

    async fn send_voice_note(&self, chat_id: &str, audio: &[u8]) -> Result<(), ChatError> {
        self.voice_notes
            .lock()
            .unwrap()
            .push((chat_id.to_string(), audio.to_vec()));
        Ok(())
    }

    async fn send_recording_voice(&self, _chat_id: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn get_file_buffer(&self, file_id: &str) -> Result<Vec<u8>, ChatError> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| ChatError::FileFetchFailed {
                file_id: file_id.to_string(),
                message: "no such file".to_string(),
            })
    }

    async fn start(&self) -> Result<(), ChatError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChatError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

pub struct StaticVoice {
    transcript: Mutex<Option<String>>,
    fail_synthesis: AtomicBool,
}

impl StaticVoice {
    /// Voice gateway that transcribes everything to `transcript`.
    pub fn transcribing(transcript: &str) -> Self {
        Self {
            transcript: Mutex::new(Some(transcript.to_string())),
            fail_synthesis: AtomicBool::new(false),
        }
    }

    /// Voice gateway whose transcription always fails.
    pub fn broken() -> Self {
        Self {
            transcript: Mutex::new(None),
            fail_synthesis: AtomicBool::new(false),
        }
    }

    pub fn fail_synthesis(&self) {
        self.fail_synthesis.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceGateway for StaticVoice {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, VoiceError> {
        self.transcript
            .lock()
            .unwrap()
            .clone()
            .ok_or(VoiceError::Unavailable)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if self.fail_synthesis.load(Ordering::SeqCst) {
            return Err(VoiceError::SynthesisFailed {
                message: "tts down".to_string(),
            });
        }
        Ok(text.as_bytes().to_vec())
    }

    async fn is_available(&self) -> VoiceAvailability {
        VoiceAvailability {
            stt: self.transcript.lock().unwrap().is_some(),
            tts: !self.fail_synthesis.load(Ordering::SeqCst),
        }
    }
}

// ---------------------------------------------------------------------------
// Steering, skills, thinking
// ---------------------------------------------------------------------------

pub struct StaticSteering {
    block: String,
}

impl StaticSteering {
    pub fn empty() -> Self {
        Self {
            block: String::new(),
        }
    }

    pub fn with_block(block: &str) -> Self {
        Self {
            block: block.to_string(),
        }
    }
}

#[async_trait]
impl SteeringProvider for StaticSteering {
    async fn build_prompt_block(&self, _project_id: Option<&str>) -> Result<String, StoreError> {
        Ok(self.block.clone())
    }
}

pub struct StaticSkills {
    skills: Vec<SkillRef>,
}

impl StaticSkills {
    pub fn none() -> Self {
        Self { skills: Vec::new() }
    }

    pub fn with(skills: Vec<SkillRef>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl SkillProvider for StaticSkills {
    async fn select_for_task(&self, _card: &Card) -> Result<Vec<SkillRef>, StoreError> {
        Ok(self.skills.clone())
    }

    fn build_prompt_block(&self, skills: &[SkillRef]) -> String {
        skills
            .iter()
            .map(|s| format!("### {}\n{}", s.name, s.instructions))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Default)]
pub struct RecordingThinking {
    pub decisions: Mutex<Vec<(String, String)>>,
    pub assumptions: Mutex<Vec<(String, String)>>,
    pub summaries: Mutex<Vec<(String, String)>>,
}

impl RecordingThinking {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThinkingPartner for RecordingThinking {
    async fn log_decision(
        &self,
        project_id: &str,
        title: &str,
        _detail: Option<&str>,
    ) -> Result<(), StoreError> {
        self.decisions
            .lock()
            .unwrap()
            .push((project_id.to_string(), title.to_string()));
        Ok(())
    }

    async fn add_assumption(&self, project_id: &str, assumption: &str) -> Result<(), StoreError> {
        self.assumptions
            .lock()
            .unwrap()
            .push((project_id.to_string(), assumption.to_string()));
        Ok(())
    }

    async fn update_state_summary(
        &self,
        project_id: &str,
        summary: &str,
    ) -> Result<(), StoreError> {
        self.summaries
            .lock()
            .unwrap()
            .push((project_id.to_string(), summary.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subprocess
// ---------------------------------------------------------------------------

/// How a scripted child behaves once spawned.
#[derive(Debug, Clone)]
pub struct ScriptedOutcome {
    /// `Some(code)`: exit immediately with that code after emitting output.
    /// `None`: stay alive until terminated or killed.
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
    /// When true, `terminate()` is ignored and only `kill()` ends the child.
    pub ignore_terminate: bool,
}

impl ScriptedOutcome {
    pub fn exits(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            output: Vec::new(),
            ignore_terminate: false,
        }
    }

    pub fn exits_with_output(code: i32, lines: &[&str]) -> Self {
        Self {
            exit_code: Some(code),
            output: lines.iter().map(|s| s.to_string()).collect(),
            ignore_terminate: false,
        }
    }

    pub fn holds() -> Self {
        Self {
            exit_code: None,
            output: Vec::new(),
            ignore_terminate: false,
        }
    }

    pub fn stubborn() -> Self {
        Self {
            exit_code: None,
            output: Vec::new(),
            ignore_terminate: true,
        }
    }
}

struct Rule {
    program: String,
    arg_contains: Option<String>,
    outcome: ScriptedOutcome,
}

/// One spawned invocation, as seen by the fake host.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env_remove: Vec<String>,
}

/// Shared control surface of a fake child; lets tests observe signals.
pub struct FakeChildState {
    pub program: String,
    pub terminated: AtomicBool,
    pub killed: AtomicBool,
    ignore_terminate: bool,
    exit_tx: Mutex<Option<oneshot::Sender<i32>>>,
}

impl FakeChildState {
    fn fire_exit(&self, code: i32) {
        if let Some(tx) = self.exit_tx.lock().unwrap().take() {
            let _ = tx.send(code);
        }
    }
}

struct FakeChild {
    pid: u32,
    state: Arc<FakeChildState>,
    output: Option<mpsc::Receiver<String>>,
    exit: Option<oneshot::Receiver<i32>>,
}

impl ChildProcess for FakeChild {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_output(&mut self) -> Option<mpsc::Receiver<String>> {
        self.output.take()
    }

    fn take_exit(&mut self) -> Option<oneshot::Receiver<i32>> {
        self.exit.take()
    }

    fn terminate(&self) {
        self.state.terminated.store(true, Ordering::SeqCst);
        if !self.state.ignore_terminate {
            self.state.fire_exit(143);
        }
    }

    fn kill(&self) {
        self.state.killed.store(true, Ordering::SeqCst);
        self.state.fire_exit(137);
    }
}

/// Scripted subprocess host.
///
/// Behavior is chosen by the first matching rule (latest scripted wins);
/// unmatched spawns exit 0 with no output.
pub struct FakeSubprocess {
    rules: Mutex<Vec<Rule>>,
    next_pid: AtomicU32,
    pub spawns: Mutex<Vec<SpawnRecord>>,
    pub children: Mutex<Vec<Arc<FakeChildState>>>,
}

impl FakeSubprocess {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(1000),
            spawns: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, program: &str, arg_contains: Option<&str>, outcome: ScriptedOutcome) {
        self.rules.lock().unwrap().insert(
            0,
            Rule {
                program: program.to_string(),
                arg_contains: arg_contains.map(str::to_string),
                outcome,
            },
        );
    }

    pub fn records_for(&self, program: &str) -> Vec<SpawnRecord> {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.program == program)
            .cloned()
            .collect()
    }

    fn outcome_for(&self, program: &str, args: &[String]) -> ScriptedOutcome {
        let rules = self.rules.lock().unwrap();
        rules
            .iter()
            .find(|rule| {
                rule.program == program
                    && rule
                        .arg_contains
                        .as_ref()
                        .is_none_or(|needle| args.iter().any(|a| a.contains(needle.as_str())))
            })
            .map(|rule| rule.outcome.clone())
            .unwrap_or_else(|| ScriptedOutcome::exits(0))
    }
}

impl Default for FakeSubprocess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subprocess for FakeSubprocess {
    async fn spawn(&self, spec: SpawnSpec) -> Result<Box<dyn ChildProcess>, SpawnError> {
        self.spawns.lock().unwrap().push(SpawnRecord {
            program: spec.program.clone(),
            args: spec.args.clone(),
            cwd: spec.cwd.clone(),
            env_remove: spec.env_remove.clone(),
        });

        let outcome = self.outcome_for(&spec.program, &spec.args);
        let (out_tx, out_rx) = mpsc::channel(outcome.output.len().max(1));
        for line in &outcome.output {
            let _ = out_tx.try_send(line.clone());
        }
        drop(out_tx);

        let (exit_tx, exit_rx) = oneshot::channel();
        let state = Arc::new(FakeChildState {
            program: spec.program.clone(),
            terminated: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            ignore_terminate: outcome.ignore_terminate,
            exit_tx: Mutex::new(Some(exit_tx)),
        });
        if let Some(code) = outcome.exit_code {
            state.fire_exit(code);
        }
        self.children.lock().unwrap().push(Arc::clone(&state));

        Ok(Box::new(FakeChild {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            state,
            output: Some(out_rx),
            exit: Some(exit_rx),
        }))
    }
}
