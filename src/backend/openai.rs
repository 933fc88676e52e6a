//! OpenAI-compatible chat backend.
//!
//! Speaks the `/chat/completions` SSE protocol with bearer authentication.
//! Any service exposing that surface works by pointing `base_url` at it.

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::api::{ChatRequest, ChatResponse};
use crate::backend::error::format_api_error;
use crate::backend::stream::LineBuffer;
use crate::backend::{to_api_messages, BackendError, ResponseGenerator};
use crate::core::message::Message;
use crate::utils::url::construct_api_url;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Outcome of one SSE line.
#[derive(Debug)]
pub(crate) enum SseEvent {
    Fragment(String),
    Done,
    Ignored,
}

/// Parse one SSE line of an OpenAI-style stream.
///
/// Non-`data:` lines and empty payloads are ignored; a non-empty payload
/// that is not a chunk is the provider reporting an error mid-stream.
pub(crate) fn parse_sse_line(line: &str) -> Result<SseEvent, BackendError> {
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return Ok(SseEvent::Ignored);
    };

    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            let fragment = response
                .choices
                .first()
                .and_then(|choice| choice.delta.content.clone())
                .unwrap_or_default();
            Ok(SseEvent::Fragment(fragment))
        }
        Err(_) if payload.trim().is_empty() => Ok(SseEvent::Ignored),
        Err(_) => Err(BackendError::Api(format_api_error(payload))),
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiBackend {
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: to_api_messages(prompt, history),
            stream: true,
        };

        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        let response = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                match parse_sse_line(&line)? {
                    SseEvent::Fragment(fragment) => {
                        if !fragment.is_empty() {
                            reply.push_str(&fragment);
                        }
                    }
                    SseEvent::Done => return Ok(reply),
                    SseEvent::Ignored => {}
                }
            }
        }

        Ok(reply)
    }
}
