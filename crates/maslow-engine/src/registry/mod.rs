//! Live-agent table and concurrency caps.
//!
//! The registry is one of the engine's two points of shared mutable state.
//! A single `std::sync::Mutex` guards the whole table; every compound
//! operation (reserve, commit, release) runs inside it and nothing suspends
//! while it is held.
//!
//! Acquisition is two-phase: `reserve` atomically checks all three caps and
//! parks a slot, then the caller does the expensive worktree + spawn work
//! outside the lock and `commit`s. Reservations that are neither committed
//! nor released expire after [`RESERVATION_TTL_MS`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use maslow_core::clock::Clock;
use maslow_core::model::AgentKind;

use crate::runner::logs::LogRing;

/// Default global cap on concurrently live agents.
pub const DEFAULT_MAX_CONCURRENT_AGENTS: usize = 3;

/// How long an uncommitted reservation holds its slot.
pub const RESERVATION_TTL_MS: u64 = 30_000;

/// Typed rejection from [`AgentRegistry::reserve`] / `commit`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("Card '{card_id}' already has a live agent")]
    CardBusy { card_id: String },

    #[error("Project '{project_id}' already has a live agent")]
    ProjectBusy { project_id: String },

    #[error("Global agent cap reached ({cap})")]
    GlobalCapReached { cap: usize },

    #[error("Reservation for card '{card_id}' is no longer valid")]
    StaleReservation { card_id: String },
}

/// Proof of a successful `reserve`. Move-only; handed to `commit` or
/// `release_reservation`.
#[derive(Debug)]
pub struct ReservationToken {
    id: u64,
    pub card_id: String,
    pub project_id: String,
}

/// Run state of a live agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunState {
    Running,
    Idle,
    Completed,
    Failed,
}

/// The in-memory supervisor record for one running agent.
///
/// Holds the live control surface (cancellation token, supervisor join
/// handle, log ring). Never serialized directly; see
/// [`AgentProcessSnapshot`].
pub struct AgentProcess {
    pub card_id: String,
    pub project_id: String,
    pub agent: AgentKind,
    pub status: AgentRunState,
    pub started_at: DateTime<Utc>,
    pub worktree_dir: PathBuf,
    pub branch_name: String,
    pub span_id: String,
    pub logs: Arc<Mutex<LogRing>>,
    /// Opaque external process handle (absent for library-mediated agents).
    pub pid: Option<u32>,
    pub cancel: CancellationToken,
    /// Set by the runner right after the supervisor task starts.
    pub supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Serializable view of an [`AgentProcess`] with both handles stripped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProcessSnapshot {
    pub card_id: String,
    pub project_id: String,
    pub agent: AgentKind,
    pub status: AgentRunState,
    pub started_at: DateTime<Utc>,
    pub worktree_dir: PathBuf,
    pub branch_name: String,
    pub span_id: String,
    pub pid: Option<u32>,
    pub recent_logs: Vec<String>,
}

impl AgentProcess {
    pub fn snapshot(&self) -> AgentProcessSnapshot {
        AgentProcessSnapshot {
            card_id: self.card_id.clone(),
            project_id: self.project_id.clone(),
            agent: self.agent,
            status: self.status,
            started_at: self.started_at,
            worktree_dir: self.worktree_dir.clone(),
            branch_name: self.branch_name.clone(),
            span_id: self.span_id.clone(),
            pid: self.pid,
            recent_logs: self.logs.lock().unwrap().tail(10),
        }
    }
}

/// Control handles needed to stop one agent, cloned out of the registry so
/// the caller never awaits while the table is locked.
pub(crate) struct AgentControl {
    pub cancel: CancellationToken,
    pub supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

struct Reservation {
    token_id: u64,
    project_id: String,
    expires_at_ms: u64,
}

struct Inner {
    cap: usize,
    next_token: u64,
    live: HashMap<String, AgentProcess>,
    reservations: HashMap<String, Reservation>,
}

impl Inner {
    fn prune_expired(&mut self, now_ms: u64) {
        self.reservations.retain(|card_id, res| {
            let keep = res.expires_at_ms > now_ms;
            if !keep {
                warn!(
                    event = "engine.registry.reservation_expired",
                    card_id = %card_id,
                    project_id = %res.project_id,
                );
            }
            keep
        });
    }

    fn project_occupied(&self, project_id: &str) -> bool {
        self.live.values().any(|a| a.project_id == project_id)
            || self.reservations.values().any(|r| r.project_id == project_id)
    }

    fn occupancy(&self) -> usize {
        self.live.len() + self.reservations.len()
    }
}

pub struct AgentRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    pub fn new(cap: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cap,
                next_token: 1,
                live: HashMap::new(),
                reservations: HashMap::new(),
            }),
            clock,
        }
    }

    pub fn set_global_cap(&self, cap: usize) {
        self.inner.lock().unwrap().cap = cap;
    }

    /// Atomically verify all caps and park a slot for `card_id`.
    pub fn reserve(
        &self,
        card_id: &str,
        project_id: &str,
    ) -> Result<ReservationToken, CapacityError> {
        let now_ms = self.clock.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.prune_expired(now_ms);

        if inner.live.contains_key(card_id) || inner.reservations.contains_key(card_id) {
            return Err(CapacityError::CardBusy {
                card_id: card_id.to_string(),
            });
        }
        if inner.project_occupied(project_id) {
            return Err(CapacityError::ProjectBusy {
                project_id: project_id.to_string(),
            });
        }
        if inner.occupancy() >= inner.cap {
            return Err(CapacityError::GlobalCapReached { cap: inner.cap });
        }

        let token_id = inner.next_token;
        inner.next_token += 1;
        inner.reservations.insert(
            card_id.to_string(),
            Reservation {
                token_id,
                project_id: project_id.to_string(),
                expires_at_ms: now_ms + RESERVATION_TTL_MS,
            },
        );

        debug!(
            event = "engine.registry.reserved",
            card_id = card_id,
            project_id = project_id,
        );
        Ok(ReservationToken {
            id: token_id,
            card_id: card_id.to_string(),
            project_id: project_id.to_string(),
        })
    }

    /// Convert a reservation into a live entry.
    pub fn commit(
        &self,
        token: ReservationToken,
        process: AgentProcess,
    ) -> Result<(), CapacityError> {
        let now_ms = self.clock.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.prune_expired(now_ms);

        match inner.reservations.get(&token.card_id) {
            Some(res) if res.token_id == token.id => {}
            _ => {
                return Err(CapacityError::StaleReservation {
                    card_id: token.card_id,
                });
            }
        }
        inner.reservations.remove(&token.card_id);
        inner.live.insert(token.card_id.clone(), process);

        debug!(event = "engine.registry.committed", card_id = %token.card_id);
        Ok(())
    }

    /// Drop a reservation without committing.
    pub fn release_reservation(&self, token: ReservationToken) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(res) = inner.reservations.get(&token.card_id)
            && res.token_id == token.id
        {
            inner.reservations.remove(&token.card_id);
        }
    }

    /// Vacate a card's slot (live entry and any reservation). No-op when
    /// absent.
    pub fn release(&self, card_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.live.remove(card_id);
        inner.reservations.remove(card_id);
        debug!(event = "engine.registry.released", card_id = card_id);
    }

    /// Serializable snapshot of all live agents, handles stripped.
    pub fn list_running(&self) -> Vec<AgentProcessSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .live
            .values()
            .map(AgentProcess::snapshot)
            .collect()
    }

    /// Count of live agents (reservations excluded).
    pub fn count_running(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    /// Whether the project has a live agent or a parked reservation.
    pub fn has_project(&self, project_id: &str) -> bool {
        self.inner.lock().unwrap().project_occupied(project_id)
    }

    pub(crate) fn control(&self, card_id: &str) -> Option<AgentControl> {
        self.inner
            .lock()
            .unwrap()
            .live
            .get(card_id)
            .map(|a| AgentControl {
                cancel: a.cancel.clone(),
                supervisor: Arc::clone(&a.supervisor),
            })
    }

    pub(crate) fn all_controls(&self) -> Vec<AgentControl> {
        self.inner
            .lock()
            .unwrap()
            .live
            .values()
            .map(|a| AgentControl {
                cancel: a.cancel.clone(),
                supervisor: Arc::clone(&a.supervisor),
            })
            .collect()
    }
}
