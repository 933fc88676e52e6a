//! Backend abstraction: one capability contract, four interchangeable
//! adapters, and the factory that validates configuration and builds them.

pub mod error;
pub mod gemini;
pub mod local;
pub mod ollama;
pub mod openai;
mod stream;

pub use error::{BackendError, ConfigurationError};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::ChatMessage;
use crate::core::message::Message;

/// Capability contract every backend satisfies.
///
/// `prompt` is the latest user utterance and is not yet part of `history`.
/// Streamed transports are accumulated internally; callers always receive
/// the complete reply as one string. The adapter never mutates `history`
/// and never retries a failed call.
#[async_trait]
pub trait ResponseGenerator: Send + Sync + fmt::Debug {
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, BackendError>;
}

/// The four recognized backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    OpenAi,
    Gemini,
    Local,
    Ollama,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Gemini => "gemini",
            BackendKind::Local => "local",
            BackendKind::Ollama => "ollama",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackendKind::OpenAi => "OpenAI",
            BackendKind::Gemini => "Gemini",
            BackendKind::Local => "Local",
            BackendKind::Ollama => "Ollama",
        }
    }

    pub fn all() -> [BackendKind; 4] {
        [
            BackendKind::OpenAi,
            BackendKind::Gemini,
            BackendKind::Local,
            BackendKind::Ollama,
        ]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "gemini" => Ok(BackendKind::Gemini),
            "local" => Ok(BackendKind::Local),
            "ollama" => Ok(BackendKind::Ollama),
            _ => Err(ConfigurationError::UnknownBackend(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendKind> for String {
    fn from(value: BackendKind) -> Self {
        value.as_str().to_string()
    }
}

/// Options a caller may supply for any backend kind. Which fields are
/// required, and the literal defaults for the optional ones, are decided
/// per kind by [`create_backend`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl BackendConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Build the adapter for `kind`, validating required fields first.
///
/// Required per kind: `api_key` for OpenAI and Gemini, `model` for Local
/// and Ollama; empty or whitespace-only values count as missing. Optional
/// fields fall back to each kind's documented literal default. Ollama
/// verifies (and if necessary pulls) the named model before this returns;
/// Local loads the model into the process. Either failure yields a
/// [`ConfigurationError`] and no adapter.
pub async fn create_backend(
    kind: BackendKind,
    config: &BackendConfig,
) -> Result<Arc<dyn ResponseGenerator>, ConfigurationError> {
    match kind {
        BackendKind::OpenAi => {
            let api_key = require(kind, "api_key", config.api_key.as_deref())?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string());
            Ok(Arc::new(openai::OpenAiBackend::new(api_key, model, base_url)))
        }
        BackendKind::Gemini => {
            let api_key = require(kind, "api_key", config.api_key.as_deref())?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string());
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string());
            Ok(Arc::new(gemini::GeminiBackend::new(api_key, model, base_url)))
        }
        BackendKind::Local => {
            let model = require(kind, "model", config.model.as_deref())?;
            Ok(Arc::new(local::LocalBackend::load(&model)?))
        }
        BackendKind::Ollama => {
            let model = require(kind, "model", config.model.as_deref())?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string());
            let backend = ollama::OllamaBackend::connect(model, base_url).await?;
            Ok(Arc::new(backend))
        }
    }
}

fn require(
    kind: BackendKind,
    field: &'static str,
    value: Option<&str>,
) -> Result<String, ConfigurationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(ConfigurationError::MissingField { kind, field }),
    }
}

/// Flatten history + prompt into an ordered provider message list.
///
/// App-authored transcript notices carry no wire role and are skipped;
/// everything else keeps its position.
pub(crate) fn to_api_messages(prompt: &str, history: &[Message]) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .filter_map(|m| {
            m.role.to_api_role().map(|role| ChatMessage {
                role: role.to_string(),
                content: m.content.clone(),
            })
        })
        .collect();
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: prompt.to_string(),
    });
    messages
}
