//! Per-card agent supervision.
//!
//! `spawn` starts the external agent process (or the ollama generation) in
//! its worktree, registers it, and returns; a dedicated supervisor task then
//! pumps output into the bounded log ring, enforces the per-project timeout,
//! answers cancellation, and runs the cleanup tail. The cleanup tail is
//! unconditional: whatever the exit path, the card gets a context snapshot,
//! the worktree is released, the registry slot is vacated, and exactly one
//! terminal event is broadcast.

pub mod command;
mod errors;
pub mod logs;
pub mod ollama;

pub use errors::RunnerError;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use maslow_config::OllamaConfig;
use maslow_core::capabilities::{ChildProcess, SpawnSpec};
use maslow_core::events::BroadcastEvent;
use maslow_core::model::{AgentKind, AgentStatus, Card, Project};

use crate::context::Collaborators;
use crate::registry::{
    AgentProcess, AgentProcessSnapshot, AgentRegistry, AgentRunState, ReservationToken,
};
use crate::subprocess::run_to_completion;
use crate::worktree::{WorktreeHandle, WorktreeManager};
use logs::LogRing;
use ollama::OllamaClient;

/// Watchdog default when the project carries no override.
pub const DEFAULT_AGENT_TIMEOUT_MINUTES: u64 = 60;

/// How long a graceful stop waits before the forced kill.
pub const GRACE_MS: u64 = 5_000;

/// Remote the completed branch is pushed to.
const PUSH_REMOTE: &str = "origin";

/// Log lines kept in the resumability snapshot.
const SNAPSHOT_TAIL_LINES: usize = 20;

/// Everything needed to dispatch one agent against one card.
pub struct SpawnAgentRequest {
    pub card: Card,
    pub project: Project,
    pub agent: AgentKind,
    pub prompt: String,
    pub worktree: WorktreeHandle,
}

/// How the supervised work ended.
enum RunOutcome {
    Exited(i32),
    TimedOut,
    Cancelled,
}

/// Terminal state after post-exit steps (push, PR) are accounted for.
enum FinalState {
    Completed,
    Failed(String),
    Cancelled,
}

pub struct AgentRunner {
    ctx: Arc<Collaborators>,
    registry: Arc<AgentRegistry>,
    worktrees: Arc<WorktreeManager>,
    ollama: OllamaClient,
}

impl AgentRunner {
    pub fn new(
        ctx: Arc<Collaborators>,
        registry: Arc<AgentRegistry>,
        worktrees: Arc<WorktreeManager>,
        ollama_config: Option<OllamaConfig>,
    ) -> Self {
        Self {
            ctx,
            registry,
            worktrees,
            ollama: OllamaClient::new(&ollama_config.unwrap_or_default()),
        }
    }

    /// Start the agent and register it. Returns once the process is running
    /// and committed; completion is the supervisor's business.
    ///
    /// On error the reservation is released; the caller still owns the
    /// worktree handle and is responsible for releasing it.
    pub async fn spawn(
        &self,
        req: SpawnAgentRequest,
        token: ReservationToken,
    ) -> Result<AgentProcessSnapshot, RunnerError> {
        let SpawnAgentRequest {
            card,
            project,
            agent,
            prompt,
            worktree,
        } = req;

        let span_id = uuid::Uuid::new_v4().to_string();
        let ring = Arc::new(Mutex::new(LogRing::default()));
        let cancel = CancellationToken::new();
        let supervisor_slot: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(None));

        // Launch. Ollama is library-mediated; everything else is a CLI
        // process whose env has the model credential scrubbed.
        let resume = card.last_session_id.as_deref();
        let child = match command::build_spawn_spec(agent, &prompt, &worktree.dir, resume) {
            Some(spec) => {
                let spawned = match self.ctx.subprocess.spawn(spec).await {
                    Ok(spawned) => spawned,
                    Err(e) => {
                        self.registry.release_reservation(token);
                        return Err(e.into());
                    }
                };
                Some(spawned)
            }
            None => None,
        };
        let pid = child.as_ref().and_then(|c| c.pid());

        let record = AgentProcess {
            card_id: card.id.clone(),
            project_id: project.id.clone(),
            agent,
            status: AgentRunState::Running,
            started_at: self.ctx.clock.now_utc(),
            worktree_dir: worktree.dir.clone(),
            branch_name: worktree.branch.clone(),
            span_id: span_id.clone(),
            logs: Arc::clone(&ring),
            pid,
            cancel: cancel.clone(),
            supervisor: Arc::clone(&supervisor_slot),
        };
        let snapshot = record.snapshot();

        if let Err(e) = self.registry.commit(token, record) {
            if let Some(child) = &child {
                child.kill();
            }
            return Err(e.into());
        }

        // Board state: branch recorded, then in_progress/running. Roll the
        // slot back if the store refuses.
        let board_result = async {
            let mut updated = card.clone();
            updated.branch_name = Some(worktree.branch.clone());
            self.ctx.kanban.update_card(&updated).await?;
            self.ctx.kanban.assign_agent(&card.id, agent).await?;
            self.ctx.kanban.start_work(&card.id, agent).await
        }
        .await;
        if let Err(e) = board_result {
            if let Some(child) = &child {
                child.kill();
            }
            self.registry.release(&card.id);
            return Err(e.into());
        }

        let supervisor = Supervisor {
            ctx: Arc::clone(&self.ctx),
            registry: Arc::clone(&self.registry),
            worktrees: Arc::clone(&self.worktrees),
            ollama: self.ollama.clone(),
            card_id: card.id.clone(),
            card_title: card.title.clone(),
            card_description: card.description.clone(),
            prompt,
            branch: worktree.branch.clone(),
            worktree_dir: worktree.dir.clone(),
            span_id,
            logs: ring,
            cancel,
            timeout_minutes: project
                .agent_timeout_minutes
                .unwrap_or(DEFAULT_AGENT_TIMEOUT_MINUTES),
        };
        let handle = tokio::spawn(supervisor.run(child));
        *supervisor_slot.lock().unwrap() = Some(handle);

        info!(
            event = "engine.runner.spawn_completed",
            card_id = %card.id,
            agent = %agent,
            pid = ?pid,
            branch = %worktree.branch,
        );
        self.ctx.bus.emit(BroadcastEvent::AgentStarted {
            card_id: card.id,
            agent,
            pid,
        });

        Ok(snapshot)
    }

    /// Cancel one agent and wait for its supervisor to finish cleanup.
    pub async fn stop(&self, card_id: &str) -> Result<(), RunnerError> {
        let control = self
            .registry
            .control(card_id)
            .ok_or_else(|| RunnerError::CardNotRunning {
                card_id: card_id.to_string(),
            })?;

        info!(event = "engine.runner.stop_started", card_id = card_id);
        control.cancel.cancel();
        let handle = control.supervisor.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(event = "engine.runner.stop_completed", card_id = card_id);
        Ok(())
    }

    /// Cancel every live agent and wait for all supervisors to reach a
    /// terminal state. Idempotent.
    pub async fn shutdown_all(&self) {
        let controls = self.registry.all_controls();
        if controls.is_empty() {
            return;
        }
        info!(
            event = "engine.runner.shutdown_started",
            agents = controls.len()
        );

        for control in &controls {
            control.cancel.cancel();
        }
        let handles: Vec<_> = controls
            .into_iter()
            .filter_map(|c| c.supervisor.lock().unwrap().take())
            .collect();
        futures::future::join_all(handles).await;

        info!(event = "engine.runner.shutdown_completed");
    }
}

/// One agent's supervisor: owns the run loop and the cleanup tail.
struct Supervisor {
    ctx: Arc<Collaborators>,
    registry: Arc<AgentRegistry>,
    worktrees: Arc<WorktreeManager>,
    ollama: OllamaClient,
    card_id: String,
    card_title: String,
    card_description: String,
    prompt: String,
    branch: String,
    worktree_dir: PathBuf,
    span_id: String,
    logs: Arc<Mutex<LogRing>>,
    cancel: CancellationToken,
    timeout_minutes: u64,
}

impl Supervisor {
    async fn run(self, child: Option<Box<dyn ChildProcess>>) {
        let outcome = match child {
            Some(child) => self.run_child(child).await,
            None => self.run_ollama().await,
        };

        let final_state = match outcome {
            RunOutcome::Exited(0) => match self.push_and_open_pr().await {
                Ok(()) => FinalState::Completed,
                Err(reason) => FinalState::Failed(reason),
            },
            RunOutcome::Exited(code) => {
                FinalState::Failed(format!("agent exited with code {code}"))
            }
            RunOutcome::TimedOut => FinalState::Failed(format!(
                "agent timed out after {} minutes",
                self.timeout_minutes
            )),
            RunOutcome::Cancelled => FinalState::Cancelled,
        };

        self.finalize(final_state).await;
    }

    async fn run_child(&self, mut child: Box<dyn ChildProcess>) -> RunOutcome {
        let mut output = child.take_output();
        let Some(mut exit) = child.take_exit() else {
            error!(event = "engine.runner.exit_channel_missing", card_id = %self.card_id);
            return RunOutcome::Exited(-1);
        };

        let timeout = sleep(Duration::from_secs(self.timeout_minutes * 60));
        tokio::pin!(timeout);

        let outcome = loop {
            tokio::select! {
                maybe_line = recv_line(&mut output) => match maybe_line {
                    Some(line) => self.logs.lock().unwrap().push(line),
                    None => output = None,
                },
                code = &mut exit => break RunOutcome::Exited(code.unwrap_or(-1)),
                _ = &mut timeout => {
                    warn!(
                        event = "engine.runner.watchdog_fired",
                        card_id = %self.card_id,
                        timeout_minutes = self.timeout_minutes,
                    );
                    stop_child(child.as_ref(), &mut exit).await;
                    break RunOutcome::TimedOut;
                }
                _ = self.cancel.cancelled() => {
                    stop_child(child.as_ref(), &mut exit).await;
                    break RunOutcome::Cancelled;
                }
            }
        };

        // Keep whatever output is still buffered for the snapshot excerpt.
        if let Some(rx) = output.as_mut() {
            while let Ok(line) = rx.try_recv() {
                self.logs.lock().unwrap().push(line);
            }
        }

        outcome
    }

    async fn run_ollama(&self) -> RunOutcome {
        let logs = Arc::clone(&self.logs);
        let generate = self.ollama.generate(&self.prompt, move |line| {
            logs.lock().unwrap().push(line);
        });

        tokio::select! {
            result = generate => match result {
                Ok(()) => RunOutcome::Exited(0),
                Err(e) => {
                    self.logs.lock().unwrap().push(e.to_string());
                    RunOutcome::Exited(1)
                }
            },
            _ = sleep(Duration::from_secs(self.timeout_minutes * 60)) => RunOutcome::TimedOut,
            _ = self.cancel.cancelled() => RunOutcome::Cancelled,
        }
    }

    /// Completion gate: the branch must be pushed and a PR opened before the
    /// card counts as done.
    async fn push_and_open_pr(&self) -> Result<(), String> {
        let push = SpawnSpec::new("git", self.worktree_dir.clone()).args([
            "push",
            "-u",
            PUSH_REMOTE,
            &self.branch,
        ]);
        match run_to_completion(self.ctx.subprocess.as_ref(), push).await {
            Ok(out) if out.success() => {}
            Ok(out) => return Err(format!("branch push failed: {}", out.tail(3))),
            Err(e) => return Err(format!("branch push failed: {e}")),
        }

        let pr = SpawnSpec::new("gh", self.worktree_dir.clone()).args([
            "pr",
            "create",
            "--head",
            &self.branch,
            "--title",
            &self.card_title,
            "--body",
            &self.card_description,
        ]);
        match run_to_completion(self.ctx.subprocess.as_ref(), pr).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(format!("PR creation failed: {}", out.tail(3))),
            Err(e) => Err(format!("PR creation failed: {e}")),
        }
    }

    /// The guaranteed cleanup tail. Every step is best-effort and
    /// independent so a failing collaborator can never leave a worktree or
    /// a ghost registry entry behind.
    async fn finalize(&self, final_state: FinalState) {
        let excerpt = self
            .logs
            .lock()
            .unwrap()
            .tail(SNAPSHOT_TAIL_LINES)
            .join("\n");
        if let Err(e) = self
            .ctx
            .kanban
            .save_context(&self.card_id, &excerpt, &self.span_id)
            .await
        {
            warn!(event = "engine.runner.save_context_failed", card_id = %self.card_id, error = %e);
        }

        let board_update = match &final_state {
            FinalState::Completed => self.ctx.kanban.complete_work(&self.card_id).await,
            FinalState::Failed(reason) => {
                self.ctx
                    .kanban
                    .update_agent_status(&self.card_id, AgentStatus::Blocked, Some(reason))
                    .await
            }
            FinalState::Cancelled => {
                // Operator-initiated stop: leave the card immediately
                // reschedulable.
                self.ctx
                    .kanban
                    .update_agent_status(&self.card_id, AgentStatus::Idle, None)
                    .await
            }
        };
        if let Err(e) = board_update {
            warn!(event = "engine.runner.board_update_failed", card_id = %self.card_id, error = %e);
        }

        self.worktrees.release(&self.worktree_dir).await;
        self.registry.release(&self.card_id);

        let event = match final_state {
            FinalState::Completed => {
                info!(event = "engine.runner.agent_completed", card_id = %self.card_id);
                BroadcastEvent::AgentCompleted {
                    card_id: self.card_id.clone(),
                }
            }
            FinalState::Failed(reason) => {
                warn!(
                    event = "engine.runner.agent_failed",
                    card_id = %self.card_id,
                    reason = %reason,
                );
                BroadcastEvent::AgentFailed {
                    card_id: self.card_id.clone(),
                    reason,
                }
            }
            FinalState::Cancelled => {
                info!(event = "engine.runner.agent_cancelled", card_id = %self.card_id);
                BroadcastEvent::AgentCancelled {
                    card_id: self.card_id.clone(),
                }
            }
        };
        self.ctx.bus.emit(event);
    }
}

async fn recv_line(output: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match output {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Graceful stop: signal, wait up to [`GRACE_MS`], then force-kill.
async fn stop_child(child: &dyn ChildProcess, exit: &mut oneshot::Receiver<i32>) {
    use tokio::sync::oneshot::error::TryRecvError;
    match exit.try_recv() {
        Ok(_) | Err(TryRecvError::Closed) => return,
        Err(TryRecvError::Empty) => {}
    }

    child.terminate();
    let grace = sleep(Duration::from_millis(GRACE_MS));
    tokio::pin!(grace);
    tokio::select! {
        _ = &mut *exit => {}
        _ = &mut grace => {
            child.kill();
            let _ = tokio::time::timeout(Duration::from_millis(GRACE_MS), exit).await;
        }
    }
}
