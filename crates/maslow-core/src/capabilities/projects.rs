use async_trait::async_trait;

use super::errors::StoreError;
use crate::model::Project;

/// Project storage.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;
}
