//! Ollama chat backend.
//!
//! Talks to a running Ollama server over HTTP. Construction verifies that
//! the requested model is present (`/api/show`) and pulls it when it is
//! not, waiting for the pull to finish; a model the server cannot provide
//! fails construction and no adapter is returned. Chat responses stream as
//! NDJSON from `/api/chat`.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::api::ChatRequest;
use crate::backend::error::format_api_error;
use crate::backend::stream::LineBuffer;
use crate::backend::{to_api_messages, BackendError, ConfigurationError, ResponseGenerator};
use crate::core::message::Message;
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    content: String,
}

#[derive(Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    model: String,
}

/// Outcome of one NDJSON chat line.
#[derive(Debug)]
pub(crate) enum ChatEvent {
    Fragment(String),
    Done,
}

/// Parse one NDJSON line of an Ollama chat stream.
pub(crate) fn parse_chat_line(line: &str) -> Result<ChatEvent, BackendError> {
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| BackendError::Stream(format!("unparseable chat chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(BackendError::Api(format_api_error(&error)));
    }
    if chunk.done {
        return Ok(ChatEvent::Done);
    }
    Ok(ChatEvent::Fragment(
        chunk.message.map(|m| m.content).unwrap_or_default(),
    ))
}

/// List the models installed on an Ollama server.
pub async fn list_models(base_url: &str) -> Result<Vec<String>, BackendError> {
    let base_url = normalize_base_url(base_url);
    let url = format!("{base_url}/api/tags");
    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;

    if !response.status().is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(BackendError::Api(format_api_error(&body)));
    }

    let tags: TagsResponse = response
        .json()
        .await
        .map_err(|e| BackendError::Stream(format!("unparseable tag list: {e}")))?;
    Ok(tags.models.into_iter().map(|m| m.model).collect())
}

impl OllamaBackend {
    /// Connect to the server and make sure `model` is usable, pulling it
    /// if the server does not have it yet. The pull is awaited to
    /// completion; its failure fails construction.
    pub async fn connect(model: String, base_url: String) -> Result<Self, ConfigurationError> {
        let backend = Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(&base_url),
            model,
        };
        backend.ensure_model().await?;
        Ok(backend)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ensure_model(&self) -> Result<(), ConfigurationError> {
        if self.model_present().await? {
            debug!(model = %self.model, "model already present on server");
            return Ok(());
        }
        info!(model = %self.model, "model not present on server, pulling");
        self.pull_model().await
    }

    async fn model_present(&self) -> Result<bool, ConfigurationError> {
        let url = format!("{}/api/show", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model }))
            .send()
            .await
            .map_err(|e| self.unavailable(format!("cannot reach server at {}: {e}", self.base_url)))?;
        Ok(response.status().is_success())
    }

    async fn pull_model(&self) -> Result<(), ConfigurationError> {
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "stream": false }))
            .send()
            .await
            .map_err(|e| self.unavailable(format!("pull request failed: {e}")))?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(self.unavailable(format!("pull rejected: {}", body.trim())));
        }

        let status: PullStatus = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("unparseable pull response: {e}")))?;

        if let Some(error) = status.error {
            return Err(self.unavailable(format!("pull failed: {error}")));
        }
        if status.status != "success" {
            return Err(self.unavailable(format!("pull ended with status '{}'", status.status)));
        }

        info!(model = %self.model, "model pulled");
        Ok(())
    }

    fn unavailable(&self, reason: String) -> ConfigurationError {
        ConfigurationError::ModelUnavailable {
            model: self.model.clone(),
            reason,
        }
    }
}

#[async_trait]
impl ResponseGenerator for OllamaBackend {
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: to_api_messages(prompt, history),
            stream: true,
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(BackendError::Api(format_api_error(&body)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::new();
        let mut reply = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| BackendError::Request(e.to_string()))?;
            buffer.extend(&bytes);

            while let Some(line) = buffer.next_line()? {
                if line.is_empty() {
                    continue;
                }
                match parse_chat_line(&line)? {
                    ChatEvent::Fragment(fragment) => {
                        if !fragment.is_empty() {
                            reply.push_str(&fragment);
                        }
                    }
                    ChatEvent::Done => return Ok(reply),
                }
            }
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_accumulate_until_done() {
        let lines = [
            r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":"lo, "},"done":false}"#,
            r#"{"message":{"role":"assistant","content":"world"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#,
        ];

        let mut reply = String::new();
        for line in &lines[..3] {
            match parse_chat_line(line).unwrap() {
                ChatEvent::Fragment(f) => reply.push_str(&f),
                ChatEvent::Done => panic!("premature done"),
            }
        }
        assert_eq!(reply, "Hello, world");
        assert!(matches!(parse_chat_line(lines[3]).unwrap(), ChatEvent::Done));
    }

    #[test]
    fn server_errors_fail_the_turn() {
        let err = parse_chat_line(r#"{"error":"model 'missing' not found"}"#)
            .expect_err("error line must fail");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn garbage_lines_are_stream_errors() {
        assert!(matches!(
            parse_chat_line("not json"),
            Err(BackendError::Stream(_))
        ));
    }
}
