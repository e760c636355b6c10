use async_trait::async_trait;

use super::errors::StoreError;
use crate::model::ChatSession;

/// Chat session storage, keyed by chat id.
#[async_trait]
pub trait ChatSessionStore: Send + Sync {
    async fn get_session(&self, chat_id: &str) -> Result<Option<ChatSession>, StoreError>;

    async fn save_session(&self, session: &ChatSession) -> Result<(), StoreError>;

    async fn update_last_active(&self, chat_id: &str) -> Result<(), StoreError>;

    async fn update_context_usage(&self, chat_id: &str, percent: f64) -> Result<(), StoreError>;

    async fn delete_session(&self, chat_id: &str) -> Result<(), StoreError>;

    async fn get_last_active_chat_id(&self) -> Result<Option<String>, StoreError>;
}
