//! The periodic scheduler.
//!
//! One tick scans active projects in discovery order, dispatches at most one
//! new agent per project within the global cap, reclaims cards that have
//! been blocked too long, and always ends by emitting `heartbeat.tick`.
//! Ticks never queue: a tick arriving while one is in flight returns
//! immediately.

pub mod constraints;
mod reconcile;

pub use constraints::{HEARTBEAT_DOC, HeartbeatConstraints};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use maslow_core::capabilities::StoreError;
use maslow_core::events::BroadcastEvent;
use maslow_core::model::{AgentStatus, Card, Column, Project};
use maslow_core::prompt::{self, PromptInputs};

use crate::context::Collaborators;
use crate::registry::AgentRegistry;
use crate::runner::{AgentRunner, SpawnAgentRequest};
use crate::worktree::WorktreeManager;

/// Maximum derived brief title length, `...` included.
const TITLE_MAX_LEN: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("No active project to attach the brief to")]
    NoActiveProject,

    #[error("Store error: {source}")]
    Store {
        #[from]
        source: StoreError,
    },
}

/// Options for [`Heartbeat::submit_task_brief`].
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub project_id: Option<String>,
    /// Run a tick right after creating the card.
    pub immediate: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            project_id: None,
            immediate: true,
        }
    }
}

/// Non-reentrant, non-queueing lock. `try_acquire` either takes the lock or
/// reports it busy; nobody ever waits.
struct TryLock {
    busy: AtomicBool,
}

struct TryLockGuard<'a> {
    lock: &'a TryLock,
}

impl TryLock {
    fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> Option<TryLockGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .ok()
            .map(|_| TryLockGuard { lock: self })
    }
}

impl Drop for TryLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

struct CronState {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Cheaply cloneable handle; all clones share one scheduler.
#[derive(Clone)]
pub struct Heartbeat {
    inner: Arc<HeartbeatInner>,
}

struct HeartbeatInner {
    ctx: Arc<Collaborators>,
    registry: Arc<AgentRegistry>,
    runner: Arc<AgentRunner>,
    worktrees: Arc<WorktreeManager>,
    constraints: Mutex<HeartbeatConstraints>,
    tick_lock: TryLock,
    synth_lock: TryLock,
    cron: Mutex<CronState>,
}

impl Heartbeat {
    pub fn new(
        ctx: Arc<Collaborators>,
        registry: Arc<AgentRegistry>,
        runner: Arc<AgentRunner>,
        worktrees: Arc<WorktreeManager>,
    ) -> Self {
        Self {
            inner: Arc::new(HeartbeatInner {
                ctx,
                registry,
                runner,
                worktrees,
                constraints: Mutex::new(HeartbeatConstraints::default()),
                tick_lock: TryLock::new(),
                synth_lock: TryLock::new(),
                cron: Mutex::new(CronState {
                    token: None,
                    handle: None,
                }),
            }),
        }
    }

    /// Effective constraints (defaults until `start` loads the document).
    pub fn constraints(&self) -> HeartbeatConstraints {
        self.inner.constraints.lock().unwrap().clone()
    }

    /// Load constraints, reconcile the board and `.worktrees/`, run one
    /// immediate tick, then install the periodic schedule.
    pub async fn start(&self) {
        let inner = &self.inner;
        let loaded = constraints::load(&inner.ctx.workspace_dir);
        inner.registry.set_global_cap(loaded.max_concurrent_agents);
        let period_secs = loaded.tick_period_secs;
        *inner.constraints.lock().unwrap() = loaded;

        reconcile::reset_stuck_cards(&inner.ctx).await;
        reconcile::sweep_orphan_worktrees(&inner.ctx, &inner.worktrees).await;

        self.tick().await;

        let heartbeat = self.clone();
        let token = CancellationToken::new();
        let cron_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(period_secs));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The immediate tick already ran; skip the interval's first fire.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cron_token.cancelled() => break,
                    _ = interval.tick() => {
                        heartbeat.tick().await;
                        heartbeat.synthesize().await;
                    }
                }
            }
        });

        let mut cron = inner.cron.lock().unwrap();
        if let Some(previous) = cron.token.take() {
            previous.cancel();
        }
        if let Some(previous) = cron.handle.take() {
            previous.abort();
        }
        cron.token = Some(token);
        cron.handle = Some(handle);
        drop(cron);

        info!(
            event = "engine.heartbeat.start_completed",
            tick_period_secs = period_secs,
        );
    }

    /// Cancel the periodic schedule. Idempotent; does not touch live agents.
    pub async fn stop(&self) {
        let (token, handle) = {
            let mut cron = self.inner.cron.lock().unwrap();
            (cron.token.take(), cron.handle.take())
        };
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(event = "engine.heartbeat.stop_completed");
    }

    /// One scheduling pass. Returns immediately when a tick is already in
    /// flight; the skipped call produces no side effects.
    pub async fn tick(&self) {
        self.inner.tick().await;
    }

    /// Sweep branch-verified cards into `done`. Merge mechanics live behind
    /// the kanban collaborator; this owns only the try-lock and the
    /// idempotent sweep.
    pub async fn synthesize(&self) {
        self.inner.synthesize().await;
    }

    /// Turn a free-form brief into a backlog card on the best-matching
    /// active project.
    pub async fn submit_task_brief(
        &self,
        text: &str,
        opts: SubmitOptions,
    ) -> Result<Card, HeartbeatError> {
        let inner = &self.inner;
        let projects = inner.ctx.projects.get_projects().await?;
        let active: Vec<Project> = projects.into_iter().filter(Project::is_active).collect();

        let text_lower = text.to_lowercase();
        let target = opts
            .project_id
            .as_ref()
            .and_then(|id| active.iter().find(|p| &p.id == id))
            .or_else(|| {
                active
                    .iter()
                    .find(|p| text_lower.contains(&p.name.to_lowercase()))
            })
            .or_else(|| active.first())
            .ok_or(HeartbeatError::NoActiveProject)?;

        let title = derive_title(text);
        let card = inner
            .ctx
            .kanban
            .create_card(&target.id, &title, text, Column::Backlog)
            .await?;

        info!(
            event = "engine.heartbeat.brief_accepted",
            project_id = %target.id,
            card_id = %card.id,
        );
        inner.ctx.bus.emit(BroadcastEvent::HeartbeatCardCreated {
            source: "submitTaskBrief".to_string(),
            title,
        });

        if opts.immediate {
            self.tick().await;
        }
        Ok(card)
    }
}

impl HeartbeatInner {
    async fn tick(&self) {
        let Some(_guard) = self.tick_lock.try_acquire() else {
            debug!(event = "engine.heartbeat.tick_skipped");
            return;
        };
        let constraints = self.constraints.lock().unwrap().clone();

        let projects = match self.ctx.projects.get_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(event = "engine.heartbeat.project_scan_failed", error = %e);
                self.ctx.bus.emit(BroadcastEvent::HeartbeatError {
                    project_id: None,
                    message: e.to_string(),
                });
                Vec::new()
            }
        };
        let active: Vec<Project> = projects.into_iter().filter(Project::is_active).collect();

        let mut projects_scanned = 0;
        if constraints.builder_enabled {
            for project in &active {
                if self.registry.count_running() >= constraints.max_concurrent_agents {
                    debug!(event = "engine.heartbeat.global_cap_reached");
                    break;
                }
                projects_scanned += 1;
                if project.max_concurrent_agents == Some(0) {
                    debug!(event = "engine.heartbeat.project_parked", project_id = %project.id);
                    continue;
                }
                if self.registry.has_project(&project.id) {
                    continue;
                }
                // One spawn failure must not abort the tick.
                if let Err(message) = self.try_spawn_for_project(project).await {
                    warn!(
                        event = "engine.heartbeat.spawn_failed",
                        project_id = %project.id,
                        error = %message,
                    );
                    self.ctx.bus.emit(BroadcastEvent::HeartbeatError {
                        project_id: Some(project.id.clone()),
                        message,
                    });
                }
            }
        } else {
            debug!(event = "engine.heartbeat.builder_disabled");
        }

        self.reclaim_blocked(&active, constraints.blocked_retry_minutes)
            .await;

        let agents_running = self.registry.count_running();
        self.ctx.bus.emit(BroadcastEvent::HeartbeatTick {
            projects_scanned,
            agents_running,
        });
        if projects_scanned == 0 {
            self.ctx.bus.emit(BroadcastEvent::HeartbeatIdle);
        }
    }

    async fn synthesize(&self) {
        if !self.constraints.lock().unwrap().synthesizer_enabled {
            return;
        }
        let Some(_guard) = self.synth_lock.try_acquire() else {
            debug!(event = "engine.heartbeat.synthesize_skipped");
            return;
        };

        let cards = match self.ctx.kanban.cards_awaiting_synthesis().await {
            Ok(cards) => cards,
            Err(e) => {
                warn!(event = "engine.heartbeat.synthesis_query_failed", error = %e);
                return;
            }
        };
        for card in cards {
            match self.ctx.kanban.complete_work(&card.id).await {
                Ok(()) => info!(event = "engine.heartbeat.synthesized", card_id = %card.id),
                Err(e) => warn!(
                    event = "engine.heartbeat.synthesize_card_failed",
                    card_id = %card.id,
                    error = %e,
                ),
            }
        }
    }

    /// Try to dispatch one agent for a project. `Ok` covers "no card" and
    /// "caps full" (both are normal); `Err` carries a broadcastable message.
    async fn try_spawn_for_project(&self, project: &Project) -> Result<(), String> {
        let card = self
            .ctx
            .kanban
            .get_next(&project.id)
            .await
            .map_err(|e| e.to_string())?;
        let Some(card) = card else {
            return Ok(());
        };
        let agent = card.assigned_agent.unwrap_or_default();

        let token = match self.registry.reserve(&card.id, &project.id) {
            Ok(token) => token,
            Err(rejection) => {
                debug!(
                    event = "engine.heartbeat.reserve_rejected",
                    card_id = %card.id,
                    reason = %rejection,
                );
                return Ok(());
            }
        };

        // Prompt inputs; a failing collaborator frees the slot and the tick
        // moves on.
        let steering = match self.ctx.steering.build_prompt_block(Some(&project.id)).await {
            Ok(block) => block,
            Err(e) => {
                self.registry.release_reservation(token);
                return Err(format!("steering block failed: {e}"));
            }
        };
        let skills = match self.ctx.skills.select_for_task(&card).await {
            Ok(selected) => self.ctx.skills.build_prompt_block(&selected),
            Err(e) => {
                self.registry.release_reservation(token);
                return Err(format!("skill selection failed: {e}"));
            }
        };
        let prompt = prompt::build(
            &card,
            Some(project),
            &PromptInputs {
                steering_block: &steering,
                previous_snapshot: card.context_snapshot.as_deref(),
                skill_block: &skills,
            },
        );

        let worktree = match self.worktrees.acquire(&card.id, agent, &card.title).await {
            Ok(worktree) => worktree,
            Err(e) => {
                self.registry.release_reservation(token);
                return Err(e.to_string());
            }
        };

        let request = SpawnAgentRequest {
            card: card.clone(),
            project: project.clone(),
            agent,
            prompt,
            worktree: worktree.clone(),
        };
        match self.runner.spawn(request, token).await {
            Ok(_) => {
                self.ctx.bus.emit(BroadcastEvent::HeartbeatSpawned {
                    card_id: card.id,
                    project_id: project.id.clone(),
                    agent,
                });
                Ok(())
            }
            Err(e) => {
                // The runner released its slot; the worktree is still ours.
                self.worktrees.release(&worktree.dir).await;
                self.registry.release(&card.id);
                Err(e.to_string())
            }
        }
    }

    /// Cards blocked longer than the retry window go back to the backlog;
    /// recently blocked cards are left alone.
    async fn reclaim_blocked(&self, active: &[Project], retry_minutes: i64) {
        let threshold = self.ctx.clock.now_utc() - chrono::Duration::minutes(retry_minutes);

        for project in active {
            let board = match self.ctx.kanban.get_board(&project.id).await {
                Ok(board) => board,
                Err(e) => {
                    warn!(
                        event = "engine.heartbeat.reclaim_board_failed",
                        project_id = %project.id,
                        error = %e,
                    );
                    continue;
                }
            };
            for card in board {
                let stale = card.column == Column::InProgress
                    && card.agent_status == Some(AgentStatus::Blocked)
                    && card.updated_at < threshold;
                if !stale {
                    continue;
                }
                match self.ctx.kanban.skip_to_back(&card.id).await {
                    Ok(()) => {
                        info!(event = "engine.heartbeat.blocked_reclaimed", card_id = %card.id);
                        self.ctx.bus.emit(BroadcastEvent::HeartbeatRetry {
                            card_id: card.id,
                            previous_status: "blocked".to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(
                            event = "engine.heartbeat.reclaim_failed",
                            card_id = %card.id,
                            error = %e,
                        );
                    }
                }
            }
        }
    }
}

/// Derive a card title from a brief: text up to the first sentence
/// terminator, trimmed, capped at [`TITLE_MAX_LEN`] with a `...` suffix.
fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .find(['.', '?', '!', '\n'])
        .unwrap_or(trimmed.len());
    let head = trimmed[..end].trim();
    let title = if head.is_empty() { trimmed } else { head };

    if title.chars().count() > TITLE_MAX_LEN {
        let mut short: String = title.chars().take(TITLE_MAX_LEN - 3).collect();
        short.push_str("...");
        short
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_first_sentence() {
        assert_eq!(
            derive_title("Fix the login flow. Then tidy the tests."),
            "Fix the login flow"
        );
        assert_eq!(derive_title("Why is CI red?\nInvestigate."), "Why is CI red");
        assert_eq!(derive_title("Ship it!"), "Ship it");
    }

    #[test]
    fn test_derive_title_no_terminator() {
        assert_eq!(derive_title("  just a short brief  "), "just a short brief");
    }

    #[test]
    fn test_derive_title_truncation() {
        let long = "a".repeat(120);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_LEN);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_derive_title_exactly_80_not_truncated() {
        let exact = "b".repeat(80);
        assert_eq!(derive_title(&exact), exact);
    }

    #[test]
    fn test_derive_title_leading_terminator_falls_back() {
        assert_eq!(derive_title("...huh"), "...huh");
    }

    #[test]
    fn test_try_lock_is_non_reentrant() {
        let lock = TryLock::new();
        let guard = lock.try_acquire();
        assert!(guard.is_some());
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_submit_options_default_is_immediate() {
        let opts = SubmitOptions::default();
        assert!(opts.immediate);
        assert!(opts.project_id.is_none());
    }
}
