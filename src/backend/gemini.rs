//! Google Gemini chat backend.
//!
//! The Generative Language API has its own message shape: entries are
//! `contents` with `parts: [{text}]`, and the assistant role is called
//! `model`. Streaming uses SSE via `streamGenerateContent?alt=sse` with no
//! terminator event — the stream simply ends.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::backend::error::format_api_error;
use crate::backend::stream::LineBuffer;
use crate::backend::{BackendError, ResponseGenerator};
use crate::core::message::{Message, Role};
use crate::utils::url::normalize_base_url;

pub const DEFAULT_MODEL: &str = "gemini-pro";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Clone)]
pub(crate) struct Content {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone)]
pub(crate) struct Part {
    pub text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn wire_role(role: Role) -> Option<&'static str> {
    match role {
        Role::User => Some("user"),
        Role::Assistant => Some("model"),
        _ => None,
    }
}

/// History + prompt as Gemini `contents`, order preserved, app notices
/// skipped.
pub(crate) fn to_contents(prompt: &str, history: &[Message]) -> Vec<Content> {
    let mut contents: Vec<Content> = history
        .iter()
        .filter_map(|m| {
            wire_role(m.role).map(|role| Content {
                role: role.to_string(),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
        })
        .collect();
    contents.push(Content {
        role: "user".to_string(),
        parts: vec![Part {
            text: prompt.to_string(),
        }],
    });
    contents
}

/// Parse one SSE line of a Gemini stream into a text fragment.
pub(crate) fn parse_sse_line(line: &str) -> Result<Option<String>, BackendError> {
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return Ok(None);
    };
    if payload.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<GenerateResponse>(payload) {
        Ok(response) => {
            if response.error.is_some() {
                return Err(BackendError::Api(format_api_error(payload)));
            }
            let fragment = response
                .candidates
                .unwrap_or_default()
                .first()
                .and_then(|candidate| candidate.content.as_ref())
                .map(|content| {
                    content
                        .parts
                        .iter()
                        .map(|part| part.text.as_str())
                        .collect::<String>()
                })
                .unwrap_or_default();
            Ok(Some(fragment))
        }
        Err(_) => Err(BackendError::Api(format_api_error(payload))),
    }
}

impl GeminiBackend {
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

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            normalize_base_url(&self.base_url),
            self.model
        )
    }
}

#[async_trait]
impl ResponseGenerator for GeminiBackend {
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, BackendError> {
        let request = GenerateRequest {
            contents: to_contents(prompt, history),
        };

        let response = self
            .client
            .post(self.stream_url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
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
                if let Some(fragment) = parse_sse_line(&line)? {
                    if !fragment.is_empty() {
                        reply.push_str(&fragment);
                    }
                }
            }
        }

        Ok(reply)
    }
}
