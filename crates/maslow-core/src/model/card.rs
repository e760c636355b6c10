use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentKind;

/// Kanban column a card sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Backlog,
    InProgress,
    Review,
    Done,
}

/// Agent-facing status of a card. Absent (`None` on the card) means no agent
/// has ever touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Blocked,
    Completed,
}

/// A unit of work on a project's kanban board.
///
/// Ordering within a column is by `(priority, position)` ascending; smaller
/// means more urgent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub column: Column,
    pub position: i64,
    pub priority: i64,
    #[serde(default)]
    pub context_snapshot: Option<String>,
    #[serde(default)]
    pub last_session_id: Option<String>,
    #[serde(default)]
    pub assigned_agent: Option<AgentKind>,
    #[serde(default)]
    pub agent_status: Option<AgentStatus>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Sort key for scheduling within a column.
    pub fn schedule_key(&self) -> (i64, i64) {
        (self.priority, self.position)
    }

    /// Whether the reconciler must treat this card as stuck: the board says
    /// work is underway but no live agent can exist after a restart.
    pub fn is_stuck_in_progress(&self) -> bool {
        self.column == Column::InProgress
            && matches!(
                self.agent_status,
                Some(AgentStatus::Running) | Some(AgentStatus::Blocked)
            )
    }
}
