//! The conversational dispatcher.
//!
//! Each incoming chat message is routed (restart command, task brief,
//! continuation affirmation, or conversational turn), resolved through the
//! voice/image collaborators, and serialized per chat so context accounting
//! stays consistent. When a session approaches its context window the
//! handoff protocol summarizes it and seeds a fresh one.

pub mod actions;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

use maslow_core::capabilities::{IncomingMessage, ModelEvent, ModelRequest, StoreError};
use maslow_core::model::{ChatSession, Column, Project};

use crate::context::Collaborators;
use crate::heartbeat::{Heartbeat, SubmitOptions};
use actions::WorkspaceAction;

/// Context usage at which a session is handed off automatically.
pub const AUTO_HANDOFF_PCT: f64 = 50.0;

/// Context usage at which the operator is offered a continuation. Only
/// reachable when the auto-handoff threshold has been reconfigured above it.
pub const WARN_PCT: f64 = 80.0;

const RESTART_COMMAND: &str = "/restart_claude";
const DEFAULT_IMAGE_PROMPT: &str = "please analyze this image";

const SESSION_CLEARED_REPLY: &str = "Session cleared";
const AUTONOMOUS_MODE_REPLY: &str = "Autonomous mode activated";
const NO_ACTIVE_SESSION_REPLY: &str = "No active session";
const GENERATING_HANDOFF_REPLY: &str = "Generating handoff summary…";
const VOICE_UNAVAILABLE_REPLY: &str =
    "Voice input is unavailable right now. Please type your message.";
const CONTINUATION_WARNING: &str =
    "This session is close to its context limit. Reply \"continue\" to hand off to a fresh session.";

static TASK_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(TASK:|Brief:)").unwrap());

/// Context thresholds, overridable per deployment.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub auto_handoff_pct: f64,
    pub warn_pct: f64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            auto_handoff_pct: AUTO_HANDOFF_PCT,
            warn_pct: WARN_PCT,
        }
    }
}

/// Per-chat serialization and the pending-continuation flag.
#[derive(Default)]
struct ChatState {
    lock: tokio::sync::Mutex<()>,
    pending_continuation: AtomicBool,
}

/// What an incoming message resolved to once attachments are handled.
enum Resolution {
    Ready {
        prompt: String,
        images: Vec<Vec<u8>>,
        used_voice: bool,
    },
    VoiceUnavailable,
    Empty,
}

pub struct SessionManager {
    ctx: Arc<Collaborators>,
    heartbeat: Heartbeat,
    policy: SessionPolicy,
    chats: Mutex<HashMap<String, Arc<ChatState>>>,
}

impl SessionManager {
    pub fn new(ctx: Arc<Collaborators>, heartbeat: Heartbeat, policy: SessionPolicy) -> Self {
        Self {
            ctx,
            heartbeat,
            policy,
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch one inbound message. Messages within a chat are processed
    /// in arrival order; across chats there is no ordering.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        let state = self.chat_state(&msg.chat_id);
        let _guard = state.lock.lock().await;
        let chat_id = msg.chat_id.clone();

        let (prompt, images, used_voice) = match self.resolve_input(&msg).await {
            Resolution::Ready {
                prompt,
                images,
                used_voice,
            } => (prompt, images, used_voice),
            Resolution::VoiceUnavailable => {
                self.reply(&chat_id, VOICE_UNAVAILABLE_REPLY).await;
                return;
            }
            Resolution::Empty => return,
        };

        if prompt.trim() == RESTART_COMMAND {
            if let Err(e) = self.ctx.chats.delete_session(&chat_id).await {
                warn!(event = "engine.session.restart_delete_failed", chat_id = %chat_id, error = %e);
            }
            state.pending_continuation.store(false, Ordering::SeqCst);
            self.reply(&chat_id, SESSION_CLEARED_REPLY).await;
            return;
        }

        if TASK_PREFIX.is_match(prompt.trim_start()) {
            match self
                .heartbeat
                .submit_task_brief(&prompt, SubmitOptions::default())
                .await
            {
                Ok(card) => {
                    info!(event = "engine.session.brief_forwarded", card_id = %card.id);
                    self.reply(&chat_id, AUTONOMOUS_MODE_REPLY).await;
                }
                Err(e) => {
                    self.reply(&chat_id, &format!("Could not queue the brief: {e}"))
                        .await;
                }
            }
            return;
        }

        if state.pending_continuation.load(Ordering::SeqCst) && is_affirmation(&prompt) {
            state.pending_continuation.store(false, Ordering::SeqCst);
            self.continuation_locked(&chat_id).await;
            return;
        }

        self.conversational_reply(&chat_id, &state, prompt, images, used_voice)
            .await;
    }

    /// Run the handoff protocol for a chat, then seed a new exchange with
    /// the summary.
    pub async fn handle_continuation(&self, chat_id: &str) {
        let state = self.chat_state(chat_id);
        let _guard = state.lock.lock().await;
        self.continuation_locked(chat_id).await;
    }

    async fn continuation_locked(&self, chat_id: &str) {
        let session = match self.ctx.chats.get_session(chat_id).await {
            Ok(Some(session)) if session.has_model_session() => session,
            _ => {
                self.reply(chat_id, NO_ACTIVE_SESSION_REPLY).await;
                return;
            }
        };

        self.reply(chat_id, GENERATING_HANDOFF_REPLY).await;
        let Some(summary) = self.generate_handoff_and_reset(&session).await else {
            return;
        };

        let state = self.chat_state(chat_id);
        self.conversational_reply(
            chat_id,
            &state,
            format!("Previous session handoff: {summary}"),
            Vec::new(),
            false,
        )
        .await;
    }

    /// Auto-handoff: same protocol, no user prompt, and the chat is left on
    /// a fresh session with zero context usage.
    async fn auto_handoff(&self, session: &ChatSession) {
        info!(
            event = "engine.session.auto_handoff_started",
            chat_id = %session.chat_id,
            context_pct = session.context_usage_percent,
        );
        self.reply(
            &session.chat_id,
            "Auto-handoff: this session is close to its context limit; compacting now.",
        )
        .await;
        self.reply(&session.chat_id, GENERATING_HANDOFF_REPLY).await;

        if self.generate_handoff_and_reset(session).await.is_none() {
            return;
        }

        let fresh = ChatSession::fresh(
            &session.chat_id,
            session.working_directory.clone(),
            self.ctx.clock.now_utc(),
        );
        if let Err(e) = self.ctx.chats.save_session(&fresh).await {
            warn!(event = "engine.session.fresh_session_save_failed", chat_id = %session.chat_id, error = %e);
        }
        info!(event = "engine.session.auto_handoff_completed", chat_id = %session.chat_id);
    }

    /// Shared middle of both handoff paths: summarize, delete the old
    /// session row, deliver the summary. `None` means the handoff failed
    /// and the old session was left intact.
    async fn generate_handoff_and_reset(&self, session: &ChatSession) -> Option<String> {
        let summary = match self
            .ctx
            .model
            .generate_handoff(&session.model_session_id, &session.working_directory)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(event = "engine.session.handoff_failed", chat_id = %session.chat_id, error = %e);
                self.reply(&session.chat_id, &format!("Handoff failed: {e}"))
                    .await;
                return None;
            }
        };

        if let Err(e) = self.ctx.chats.delete_session(&session.chat_id).await {
            warn!(event = "engine.session.session_delete_failed", chat_id = %session.chat_id, error = %e);
        }
        self.reply(&session.chat_id, &format!("Handoff summary:\n{summary}"))
            .await;
        Some(summary)
    }

    async fn conversational_reply(
        &self,
        chat_id: &str,
        state: &ChatState,
        prompt: String,
        images: Vec<Vec<u8>>,
        used_voice: bool,
    ) {
        let _ = self.ctx.chat.send_typing(chat_id).await;

        let mut session = match self.ctx.chats.get_session(chat_id).await {
            Ok(Some(session)) => session,
            _ => {
                let fresh = ChatSession::fresh(
                    chat_id,
                    self.ctx.workspace_dir.clone(),
                    self.ctx.clock.now_utc(),
                );
                if let Err(e) = self.ctx.chats.save_session(&fresh).await {
                    warn!(event = "engine.session.session_create_failed", chat_id = %chat_id, error = %e);
                }
                fresh
            }
        };

        let request = ModelRequest {
            prompt,
            cwd: session.working_directory.clone(),
            resume_session_id: session
                .has_model_session()
                .then(|| session.model_session_id.clone()),
            images,
        };
        let mut rx = match self.ctx.model.send_message(request).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(event = "engine.session.model_request_failed", chat_id = %chat_id, error = %e);
                self.reply(chat_id, &format!("Model error: {e}")).await;
                return;
            }
        };

        let mut last_text = String::new();
        let mut handoff_fired = false;
        while let Some(event) = rx.recv().await {
            match event {
                ModelEvent::Text {
                    session_id,
                    content,
                } => {
                    if let Some(id) = session_id
                        && id != session.model_session_id
                    {
                        session.model_session_id = id;
                        if let Err(e) = self.ctx.chats.save_session(&session).await {
                            warn!(event = "engine.session.session_save_failed", chat_id = %chat_id, error = %e);
                        }
                    }
                    let (visible, embedded) = actions::extract_actions(&content);
                    self.apply_actions(embedded).await;
                    if !visible.is_empty() {
                        last_text = visible.clone();
                        self.reply(chat_id, &visible).await;
                    }
                }
                ModelEvent::ToolCall { name, summary } => {
                    self.reply(chat_id, &format!("tool: {name} {summary}")).await;
                }
                ModelEvent::ToolResult { name, summary } => {
                    self.reply(chat_id, &format!("tool result: {name} {summary}"))
                        .await;
                }
                ModelEvent::Error { message } => {
                    self.reply(chat_id, &format!("Model error: {message}")).await;
                }
                ModelEvent::Result { usage } => {
                    let pct = usage.percent_used();
                    if let Err(e) = self.ctx.chats.update_context_usage(chat_id, pct).await {
                        warn!(event = "engine.session.usage_update_failed", chat_id = %chat_id, error = %e);
                    }
                    session.context_usage_percent = pct;

                    if pct >= self.policy.auto_handoff_pct {
                        if session.has_model_session() {
                            self.auto_handoff(&session).await;
                            handoff_fired = true;
                            // Suppress any further replies from this stream.
                            break;
                        }
                        warn!(
                            event = "engine.session.handoff_skipped_no_session",
                            chat_id = %chat_id,
                            context_pct = pct,
                        );
                    } else if pct >= self.policy.warn_pct {
                        self.reply(chat_id, CONTINUATION_WARNING).await;
                        state.pending_continuation.store(true, Ordering::SeqCst);
                    }
                }
            }
        }

        if let Err(e) = self.ctx.chats.update_last_active(chat_id).await {
            warn!(event = "engine.session.last_active_update_failed", chat_id = %chat_id, error = %e);
        }

        if used_voice && !handoff_fired && !last_text.is_empty() {
            let _ = self.ctx.chat.send_recording_voice(chat_id).await;
            match self.ctx.voice.synthesize(&last_text).await {
                Ok(audio) => {
                    if let Err(e) = self.ctx.chat.send_voice_note(chat_id, &audio).await {
                        warn!(event = "engine.session.voice_note_failed", chat_id = %chat_id, error = %e);
                    }
                }
                // The text reply already went out; a broken synthesizer
                // only costs the audio copy.
                Err(e) => {
                    warn!(event = "engine.session.synthesis_failed", chat_id = %chat_id, error = %e);
                }
            }
        }
    }

    /// Resolve voice and image attachments into a text prompt.
    async fn resolve_input(&self, msg: &IncomingMessage) -> Resolution {
        let mut parts: Vec<String> = Vec::new();
        let mut used_voice = false;

        if let Some(file_id) = &msg.voice_file_id {
            let audio = match self.ctx.chat.get_file_buffer(file_id).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(event = "engine.session.voice_fetch_failed", chat_id = %msg.chat_id, error = %e);
                    return Resolution::VoiceUnavailable;
                }
            };
            match self.ctx.voice.transcribe(&audio).await {
                Ok(text) => {
                    used_voice = true;
                    if !text.trim().is_empty() {
                        parts.push(text.trim().to_string());
                    }
                }
                Err(e) => {
                    warn!(event = "engine.session.transcription_failed", chat_id = %msg.chat_id, error = %e);
                    return Resolution::VoiceUnavailable;
                }
            }
        }

        if let Some(text) = &msg.text
            && !text.trim().is_empty()
        {
            parts.push(text.trim().to_string());
        }
        if let Some(caption) = &msg.caption
            && !caption.trim().is_empty()
        {
            parts.push(caption.trim().to_string());
        }

        let mut images = Vec::new();
        for file_id in &msg.image_file_ids {
            match self.ctx.chat.get_file_buffer(file_id).await {
                Ok(bytes) => images.push(bytes),
                Err(e) => {
                    warn!(event = "engine.session.image_fetch_failed", chat_id = %msg.chat_id, error = %e);
                }
            }
        }

        let prompt = parts.join("\n");
        if prompt.trim().is_empty() {
            if images.is_empty() {
                return Resolution::Empty;
            }
            return Resolution::Ready {
                prompt: DEFAULT_IMAGE_PROMPT.to_string(),
                images,
                used_voice,
            };
        }
        Resolution::Ready {
            prompt,
            images,
            used_voice,
        }
    }

    /// Execute embedded workspace actions against the first active project.
    /// Individual failures are swallowed per action.
    async fn apply_actions(&self, embedded: Vec<WorkspaceAction>) {
        if embedded.is_empty() {
            return;
        }

        let project = match self.ctx.projects.get_projects().await {
            Ok(projects) => projects.into_iter().find(Project::is_active),
            Err(e) => {
                warn!(event = "engine.session.action_project_scan_failed", error = %e);
                return;
            }
        };
        let Some(project) = project else {
            warn!(event = "engine.session.actions_skipped_no_project");
            return;
        };

        for action in embedded {
            if let Err(e) = self.apply_action(&project, action).await {
                warn!(event = "engine.session.action_failed", project_id = %project.id, error = %e);
            }
        }
    }

    async fn apply_action(
        &self,
        project: &Project,
        action: WorkspaceAction,
    ) -> Result<(), StoreError> {
        match action {
            WorkspaceAction::CreateCard {
                title,
                description,
                column,
            } => {
                self.ctx
                    .kanban
                    .create_card(
                        &project.id,
                        &title,
                        description.as_deref().unwrap_or(""),
                        column.unwrap_or(Column::Backlog),
                    )
                    .await?;
            }
            WorkspaceAction::MoveCard { title, column } => {
                let board = self.ctx.kanban.get_board(&project.id).await?;
                let card = board
                    .into_iter()
                    .find(|c| c.title == title)
                    .ok_or_else(|| StoreError::backend(format!("no card titled '{title}'")))?;
                self.ctx.kanban.move_card(&card.id, column).await?;
            }
            WorkspaceAction::LogDecision { title, detail } => {
                self.ctx
                    .thinking
                    .log_decision(&project.id, &title, detail.as_deref())
                    .await?;
            }
            WorkspaceAction::AddAssumption { assumption } => {
                self.ctx
                    .thinking
                    .add_assumption(&project.id, &assumption)
                    .await?;
            }
            WorkspaceAction::UpdateState { summary } => {
                self.ctx
                    .thinking
                    .update_state_summary(&project.id, &summary)
                    .await?;
            }
        }
        Ok(())
    }

    fn chat_state(&self, chat_id: &str) -> Arc<ChatState> {
        Arc::clone(
            self.chats
                .lock()
                .unwrap()
                .entry(chat_id.to_string())
                .or_default(),
        )
    }

    async fn reply(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.ctx.chat.send_message(chat_id, text).await {
            warn!(event = "engine.session.reply_failed", chat_id = %chat_id, error = %e);
        }
    }
}

fn is_affirmation(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    normalized.contains("continue")
        || matches!(normalized.as_str(), "yes" | "y" | "ok" | "okay" | "go ahead")
}
