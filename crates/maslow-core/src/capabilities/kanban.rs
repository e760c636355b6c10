use async_trait::async_trait;

use super::errors::StoreError;
use crate::model::{AgentKind, AgentStatus, Card, Column};

/// Kanban board storage.
///
/// Cards are uniquely identified by string id. `get_next` returns the most
/// urgent backlog card of a project, ordered by `(priority, position)`
/// ascending.
#[async_trait]
pub trait KanbanStore: Send + Sync {
    async fn get_board(&self, project_id: &str) -> Result<Vec<Card>, StoreError>;

    async fn get_next(&self, project_id: &str) -> Result<Option<Card>, StoreError>;

    async fn create_card(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        column: Column,
    ) -> Result<Card, StoreError>;

    async fn update_card(&self, card: &Card) -> Result<(), StoreError>;

    async fn delete_card(&self, card_id: &str) -> Result<(), StoreError>;

    async fn move_card(&self, card_id: &str, column: Column) -> Result<(), StoreError>;

    /// Return a card to the end of the backlog, clearing its agent state.
    async fn skip_to_back(&self, card_id: &str) -> Result<(), StoreError>;

    /// Persist a context snapshot so the card remains resumable, together
    /// with the session/span id that produced it.
    async fn save_context(
        &self,
        card_id: &str,
        snapshot: &str,
        session_id: &str,
    ) -> Result<(), StoreError>;

    /// Fetch the previously saved context snapshot, if any.
    async fn resume(&self, card_id: &str) -> Result<Option<String>, StoreError>;

    async fn assign_agent(&self, card_id: &str, agent: AgentKind) -> Result<(), StoreError>;

    async fn update_agent_status(
        &self,
        card_id: &str,
        status: AgentStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Move a card to `in_progress` with `agent_status = running` and stamp
    /// `started_at`.
    async fn start_work(&self, card_id: &str, agent: AgentKind) -> Result<(), StoreError>;

    /// Move a card to `done` with `agent_status = completed` and stamp
    /// `completed_at`.
    async fn complete_work(&self, card_id: &str) -> Result<(), StoreError>;

    /// Cards whose branches have been verified and are waiting for the
    /// synthesizer sweep. Verification mechanics live behind the store.
    async fn cards_awaiting_synthesis(&self) -> Result<Vec<Card>, StoreError>;
}
