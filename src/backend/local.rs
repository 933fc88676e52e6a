//! In-process text-generation backend.
//!
//! Runs a model inside the chat process instead of calling out over the
//! network. The inference runtime sits behind [`TextGenerationEngine`] so
//! the conversation formatting is independent of it; the production engine
//! is llama.cpp over a GGUF file, compiled in with the `local-llm` feature.

use async_trait::async_trait;

use crate::backend::{BackendError, ConfigurationError, ResponseGenerator};
use crate::core::message::Message;

/// Upper bound on tokens generated per turn.
pub const MAX_NEW_TOKENS: u32 = 50;

/// Completion over raw text.
///
/// `complete` returns the model's raw output, which conventionally begins
/// with the prompt text itself (completion models echo their input).
pub trait TextGenerationEngine: Send + Sync {
    fn complete(&self, prompt: &str, max_new_tokens: u32) -> Result<String, BackendError>;
}

pub struct LocalBackend {
    engine: Box<dyn TextGenerationEngine>,
    max_new_tokens: u32,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("max_new_tokens", &self.max_new_tokens)
            .finish_non_exhaustive()
    }
}

impl LocalBackend {
    /// Load the named GGUF model into the process. Loading is slow and
    /// memory-hungry; that cost is paid once, here, at construction.
    #[cfg(feature = "local-llm")]
    pub fn load(model_path: &str) -> Result<Self, ConfigurationError> {
        let engine = llama::LlamaCppEngine::load(model_path)?;
        Ok(Self::with_engine(Box::new(engine)))
    }

    #[cfg(not(feature = "local-llm"))]
    pub fn load(model_path: &str) -> Result<Self, ConfigurationError> {
        let _ = model_path;
        Err(ConfigurationError::UnsupportedBackend {
            kind: crate::backend::BackendKind::Local,
            reason: "this build does not include the in-process inference engine \
                     (rebuild with the `local-llm` feature)"
                .to_string(),
        })
    }

    pub fn with_engine(engine: Box<dyn TextGenerationEngine>) -> Self {
        Self {
            engine,
            max_new_tokens: MAX_NEW_TOKENS,
        }
    }

    /// One line per message, `role: content`, with a trailing `assistant:`
    /// cue for the model to complete.
    fn input_block(prompt: &str, history: &[Message]) -> String {
        let mut block = String::new();
        for message in history {
            if let Some(role) = message.role.to_api_role() {
                block.push_str(role);
                block.push_str(": ");
                block.push_str(&message.content);
                block.push('\n');
            }
        }
        block.push_str("user: ");
        block.push_str(prompt);
        block.push_str("\nassistant:");
        block
    }

    /// Strip the echoed input block from the raw output.
    ///
    /// This is a heuristic, not a guarantee: when tokenization or
    /// formatting drift means the raw output no longer starts with the
    /// input block verbatim, the trimmed raw output is returned unchanged
    /// and may still contain prompt text.
    fn strip_input_block(raw: &str, block: &str) -> String {
        match raw.strip_prefix(block) {
            Some(reply) => reply.trim().to_string(),
            None => raw.trim().to_string(),
        }
    }
}

#[async_trait]
impl ResponseGenerator for LocalBackend {
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, BackendError> {
        let block = Self::input_block(prompt, history);
        let raw = self.engine.complete(&block, self.max_new_tokens)?;
        Ok(Self::strip_input_block(&raw, &block))
    }
}

#[cfg(feature = "local-llm")]
mod llama {
    //! llama.cpp engine over a GGUF model file.

    use std::num::NonZeroU32;
    use std::path::Path;
    use std::sync::Mutex;

    use llama_cpp_2::context::params::LlamaContextParams;
    use llama_cpp_2::llama_backend::LlamaBackend;
    use llama_cpp_2::llama_batch::LlamaBatch;
    use llama_cpp_2::model::params::LlamaModelParams;
    use llama_cpp_2::model::{AddBos, LlamaModel, Special};
    use llama_cpp_2::sampling::LlamaSampler;
    use llama_cpp_2::token::LlamaToken;
    use tracing::info;

    use super::TextGenerationEngine;
    use crate::backend::{BackendError, ConfigurationError};

    const CONTEXT_SIZE: u32 = 4096;

    pub struct LlamaCppEngine {
        backend: LlamaBackend,
        // Contexts borrow the model mutably through the batch API; one
        // turn runs at a time, so a Mutex is enough.
        model: Mutex<LlamaModel>,
    }

    impl LlamaCppEngine {
        pub fn load(model_path: &str) -> Result<Self, ConfigurationError> {
            let path = Path::new(model_path);
            if !path.exists() {
                return Err(ConfigurationError::ModelUnavailable {
                    model: model_path.to_string(),
                    reason: "model file not found".to_string(),
                });
            }

            info!(model = %model_path, "loading GGUF model");
            let backend = LlamaBackend::init().map_err(|e| ConfigurationError::ModelUnavailable {
                model: model_path.to_string(),
                reason: format!("failed to initialize llama.cpp: {e}"),
            })?;

            let model_params = LlamaModelParams::default();
            let model = LlamaModel::load_from_file(&backend, path, &model_params).map_err(|e| {
                ConfigurationError::ModelUnavailable {
                    model: model_path.to_string(),
                    reason: format!("failed to load model: {e}"),
                }
            })?;

            Ok(Self {
                backend,
                model: Mutex::new(model),
            })
        }
    }

    impl TextGenerationEngine for LlamaCppEngine {
        fn complete(&self, prompt: &str, max_new_tokens: u32) -> Result<String, BackendError> {
            let model = self
                .model
                .lock()
                .map_err(|e| BackendError::Engine(format!("engine lock poisoned: {e}")))?;

            let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(CONTEXT_SIZE));
            let mut ctx = model
                .new_context(&self.backend, ctx_params)
                .map_err(|e| BackendError::Engine(format!("failed to create context: {e}")))?;

            let tokens = model
                .str_to_token(prompt, AddBos::Always)
                .map_err(|e| BackendError::Engine(format!("tokenization failed: {e}")))?;

            let mut batch = LlamaBatch::new(tokens.len(), 1);
            for (pos, token) in tokens.iter().enumerate() {
                let is_last = pos == tokens.len() - 1;
                batch
                    .add(*token, pos as i32, &[0], is_last)
                    .map_err(|e| BackendError::Engine(format!("failed to batch token: {e}")))?;
            }
            ctx.decode(&mut batch)
                .map_err(|e| BackendError::Engine(format!("decode failed: {e}")))?;

            let mut sampler = LlamaSampler::chain_simple([LlamaSampler::greedy()]);
            let mut output_tokens: Vec<LlamaToken> = Vec::new();
            let mut current_pos = tokens.len() as i32;
            let eos_token = model.token_eos();

            for _ in 0..max_new_tokens {
                let token = sampler.sample(&ctx, -1);
                if token == eos_token {
                    break;
                }
                sampler.accept(token);
                output_tokens.push(token);

                batch.clear();
                batch
                    .add(token, current_pos, &[0], true)
                    .map_err(|e| BackendError::Engine(format!("failed to batch token: {e}")))?;
                ctx.decode(&mut batch)
                    .map_err(|e| BackendError::Engine(format!("decode failed: {e}")))?;
                current_pos += 1;
            }

            let generated = model
                .tokens_to_str(&output_tokens, Special::Plaintext)
                .map_err(|e| BackendError::Engine(format!("failed to decode tokens: {e}")))?;

            // Completion-model contract: the raw output echoes the prompt.
            let mut raw = String::with_capacity(prompt.len() + generated.len());
            raw.push_str(prompt);
            raw.push_str(&generated);
            Ok(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    /// Engine that echoes the prompt followed by a canned completion, the
    /// way a completion model does.
    struct EchoEngine {
        completion: &'static str,
    }

    impl TextGenerationEngine for EchoEngine {
        fn complete(&self, prompt: &str, _max_new_tokens: u32) -> Result<String, BackendError> {
            Ok(format!("{prompt}{}", self.completion))
        }
    }

    /// Engine whose output does not echo the prompt at all.
    struct DriftingEngine;

    impl TextGenerationEngine for DriftingEngine {
        fn complete(&self, _prompt: &str, _max_new_tokens: u32) -> Result<String, BackendError> {
            Ok("  something else entirely  ".to_string())
        }
    }

    #[test]
    fn input_block_is_one_line_per_message_with_cue() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let block = LocalBackend::input_block("how are you", &history);
        assert_eq!(block, "user: hi\nassistant: hello\nuser: how are you\nassistant:");
    }

    #[test]
    fn app_notices_are_left_out_of_the_input_block() {
        let history = vec![Message::user("hi"), Message::app_error("backend down")];
        let block = LocalBackend::input_block("again", &history);
        assert_eq!(block, "user: hi\nuser: again\nassistant:");
    }

    #[tokio::test]
    async fn echoed_input_block_is_stripped_from_the_reply() {
        let backend = LocalBackend::with_engine(Box::new(EchoEngine {
            completion: " assistant reply text",
        }));
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let reply = backend.generate("how are you", &history).await.unwrap();
        assert_eq!(reply, "assistant reply text");
    }

    #[tokio::test]
    async fn drifting_output_is_returned_trimmed_and_unchanged() {
        let backend = LocalBackend::with_engine(Box::new(DriftingEngine));
        let reply = backend.generate("hi", &[]).await.unwrap();
        assert_eq!(reply, "something else entirely");
    }

    #[cfg(not(feature = "local-llm"))]
    #[test]
    fn load_without_the_engine_feature_is_a_configuration_error() {
        let err = LocalBackend::load("model.gguf").expect_err("must fail");
        assert!(matches!(
            err,
            ConfigurationError::UnsupportedBackend { .. }
        ));
    }
}
