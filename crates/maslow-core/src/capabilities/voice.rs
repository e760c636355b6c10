use async_trait::async_trait;

/// Which halves of the voice pipeline are usable right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceAvailability {
    pub stt: bool,
    pub tts: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Transcription failed: {message}")]
    TranscriptionFailed { message: String },

    #[error("Speech synthesis failed: {message}")]
    SynthesisFailed { message: String },

    #[error("Voice backend unavailable")]
    Unavailable,
}

/// Speech-to-text and text-to-speech.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;

    async fn is_available(&self) -> VoiceAvailability;
}
