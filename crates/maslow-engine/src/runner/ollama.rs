//! Library-mediated Ollama agent.
//!
//! Unlike the CLI agents, ollama runs through its HTTP API: one streaming
//! `POST /api/generate` per card, NDJSON chunks decoded into the agent's log
//! ring. Connect failures retry a bounded number of times.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use maslow_config::OllamaConfig;

/// Backoff unit between connect retries.
const RETRY_BACKOFF_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Ollama request failed after {attempts} attempts: {message}")]
    RequestFailed { attempts: u32, message: String },

    #[error("Ollama stream error: {message}")]
    Stream { message: String },
}

/// One NDJSON chunk of a streaming generate response.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    model: String,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        }
    }

    /// Stream one generation, feeding completed lines into `sink`.
    ///
    /// Returns once the model reports `done`. Chunks are split on newlines
    /// so the sink receives whole lines, matching subprocess output.
    pub async fn generate(
        &self,
        prompt: &str,
        mut sink: impl FnMut(String),
    ) -> Result<(), OllamaError> {
        let response = self.send_with_retries(prompt).await?;

        info!(event = "engine.ollama.stream_started", model = %self.model);

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut pending_line = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| OllamaError::Stream {
                message: e.to_string(),
            })?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let raw = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                if raw.is_empty() {
                    continue;
                }
                let parsed: GenerateChunk =
                    serde_json::from_str(&raw).map_err(|e| OllamaError::Stream {
                        message: format!("bad NDJSON chunk: {e}"),
                    })?;
                if let Some(error) = parsed.error {
                    return Err(OllamaError::Stream { message: error });
                }

                for c in parsed.response.chars() {
                    if c == '\n' {
                        sink(std::mem::take(&mut pending_line));
                    } else {
                        pending_line.push(c);
                    }
                }

                if parsed.done {
                    if !pending_line.is_empty() {
                        sink(std::mem::take(&mut pending_line));
                    }
                    info!(event = "engine.ollama.stream_completed", model = %self.model);
                    return Ok(());
                }
            }
        }

        // Stream ended without a done chunk.
        if !pending_line.is_empty() {
            sink(pending_line);
        }
        warn!(event = "engine.ollama.stream_truncated", model = %self.model);
        Err(OllamaError::Stream {
            message: "stream ended before completion".to_string(),
        })
    }

    async fn send_with_retries(&self, prompt: &str) -> Result<reqwest::Response, OllamaError> {
        let url = format!("{}/api/generate", self.host);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
        });

        let attempts = self.max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.http.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            debug!(
                event = "engine.ollama.request_retry",
                attempt = attempt,
                error = %last_error,
            );
            if attempt < attempts {
                sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
            }
        }

        Err(OllamaError::RequestFailed {
            attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_parsing() {
        let chunk: GenerateChunk =
            serde_json::from_str(r#"{"response":"hello","done":false}"#).unwrap();
        assert_eq!(chunk.response, "hello");
        assert!(!chunk.done);
        assert!(chunk.error.is_none());
    }

    #[test]
    fn test_chunk_parsing_error_field() {
        let chunk: GenerateChunk =
            serde_json::from_str(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model not found"));
    }

    #[test]
    fn test_host_trailing_slash_trimmed() {
        let client = OllamaClient::new(&OllamaConfig {
            host: "http://localhost:11434/".to_string(),
            ..OllamaConfig::default()
        });
        assert_eq!(client.host, "http://localhost:11434");
    }
}
