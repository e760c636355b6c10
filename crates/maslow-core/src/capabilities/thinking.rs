use async_trait::async_trait;

use super::errors::StoreError;

/// The thinking-partner collaborator: decision log, assumptions document,
/// and rolling state summary per project.
#[async_trait]
pub trait ThinkingPartner: Send + Sync {
    async fn log_decision(
        &self,
        project_id: &str,
        title: &str,
        detail: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn add_assumption(&self, project_id: &str, assumption: &str) -> Result<(), StoreError>;

    async fn update_state_summary(&self, project_id: &str, summary: &str)
    -> Result<(), StoreError>;
}
