/// Errors surfaced by the storage-backed collaborators (kanban, project,
/// chat-session stores and the thinking partner).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Card '{card_id}' not found")]
    CardNotFound { card_id: String },

    #[error("Project '{project_id}' not found")]
    ProjectNotFound { project_id: String },

    #[error("Store backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}
