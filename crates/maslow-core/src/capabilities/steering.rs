use async_trait::async_trait;

use super::errors::StoreError;

/// Persisted steering corrections injected into every build agent's prompt.
#[async_trait]
pub trait SteeringProvider: Send + Sync {
    /// Render the steering block for a project (or the global block when no
    /// project is given). May be empty.
    async fn build_prompt_block(&self, project_id: Option<&str>) -> Result<String, StoreError>;
}
