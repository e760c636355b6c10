use async_trait::async_trait;

/// An inbound operator message from the chat bridge.
///
/// Voice and image attachments arrive as opaque file ids; the engine fetches
/// bytes through [`ChatAdapter::get_file_buffer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingMessage {
    pub chat_id: String,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub image_file_ids: Vec<String>,
    pub voice_file_id: Option<String>,
}

impl IncomingMessage {
    pub fn text(chat_id: &str, text: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat transport error: {message}")]
    Transport { message: String },

    #[error("File '{file_id}' could not be fetched: {message}")]
    FileFetchFailed { file_id: String, message: String },
}

/// The outbound side of the chat bridge.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError>;

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChatError>;

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), ChatError>;

    async fn send_voice_note(&self, chat_id: &str, audio: &[u8]) -> Result<(), ChatError>;

    /// Show the "recording a voice message" indicator.
    async fn send_recording_voice(&self, chat_id: &str) -> Result<(), ChatError>;

    async fn get_file_buffer(&self, file_id: &str) -> Result<Vec<u8>, ChatError>;

    async fn start(&self) -> Result<(), ChatError>;

    async fn stop(&self) -> Result<(), ChatError>;
}
