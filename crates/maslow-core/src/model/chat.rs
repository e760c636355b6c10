use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One operator chat's conversational state.
///
/// `model_session_id` may be empty, meaning "no active model session": the
/// next conversational turn starts fresh instead of resuming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub chat_id: String,
    pub model_session_id: String,
    pub working_directory: PathBuf,
    pub last_active_at: DateTime<Utc>,
    /// Most recently reported context usage, in `[0, 100]`.
    pub context_usage_percent: f64,
}

impl ChatSession {
    /// Create a fresh session with no model session attached.
    pub fn fresh(chat_id: &str, working_directory: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            model_session_id: String::new(),
            working_directory,
            last_active_at: now,
            context_usage_percent: 0.0,
        }
    }

    pub fn has_model_session(&self) -> bool {
        !self.model_session_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_has_no_model_session() {
        let session = ChatSession::fresh("chat-1", PathBuf::from("/tmp"), Utc::now());
        assert!(!session.has_model_session());
        assert_eq!(session.context_usage_percent, 0.0);
    }

    #[test]
    fn test_has_model_session() {
        let mut session = ChatSession::fresh("chat-1", PathBuf::from("/tmp"), Utc::now());
        session.model_session_id = "sess-abc".to_string();
        assert!(session.has_model_session());
    }

    #[test]
    fn test_serde_camel_case() {
        let session = ChatSession::fresh("chat-1", PathBuf::from("/tmp"), Utc::now());
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("modelSessionId"));
        assert!(json.contains("contextUsagePercent"));
    }
}
