//! Session state: the conversation transcript and the live backend.
//!
//! The context object owns both, so lifecycle rules live in one place:
//! the adapter is replaced wholesale on any backend change (never mutated
//! in place), and the transcript resets when the backend kind changes.

use std::sync::Arc;

use crate::backend::{
    create_backend, BackendConfig, BackendKind, ConfigurationError, ResponseGenerator,
};
use crate::core::message::Message;

pub struct SessionContext {
    kind: BackendKind,
    generator: Arc<dyn ResponseGenerator>,
    history: Vec<Message>,
}

/// Everything a turn needs, snapshotted so the generate call can run on a
/// spawned task while the session keeps serving the UI. `history` excludes
/// the prompt itself.
pub struct TurnRequest {
    pub generator: Arc<dyn ResponseGenerator>,
    pub prompt: String,
    pub history: Vec<Message>,
}

impl SessionContext {
    pub async fn new(kind: BackendKind, config: &BackendConfig) -> Result<Self, ConfigurationError> {
        let generator = create_backend(kind, config).await?;
        Ok(Self::from_generator(kind, generator))
    }

    pub fn from_generator(kind: BackendKind, generator: Arc<dyn ResponseGenerator>) -> Self {
        Self {
            kind,
            generator,
            history: Vec::new(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Replace the live adapter. The new adapter is built first; if
    /// construction fails the session is left untouched. Switching to a
    /// different backend kind also resets the transcript.
    pub async fn switch_backend(
        &mut self,
        kind: BackendKind,
        config: &BackendConfig,
    ) -> Result<(), ConfigurationError> {
        let generator = create_backend(kind, config).await?;
        if kind != self.kind {
            self.history.clear();
        }
        self.kind = kind;
        self.generator = generator;
        Ok(())
    }

    /// Record the user's prompt and hand out what the turn needs. The
    /// snapshot taken first keeps the prompt out of the history the
    /// adapter sees.
    pub fn begin_turn(&mut self, prompt: &str) -> TurnRequest {
        let request = TurnRequest {
            generator: Arc::clone(&self.generator),
            prompt: prompt.to_string(),
            history: self.history.clone(),
        };
        self.history.push(Message::user(prompt));
        request
    }

    /// Append the assistant's reply for a turn started with `begin_turn`.
    pub fn complete_turn(&mut self, reply: String) {
        self.history.push(Message::assistant(reply));
    }

    /// Append an app-authored notice to the transcript. Notices render but
    /// are never sent to a backend.
    pub fn push_notice(&mut self, notice: Message) {
        debug_assert!(notice.is_app());
        self.history.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Canned(&'static str);

    #[async_trait]
    impl ResponseGenerator for Canned {
        async fn generate(
            &self,
            _prompt: &str,
            _history: &[Message],
        ) -> Result<String, BackendError> {
            Ok(self.0.to_string())
        }
    }

    fn session() -> SessionContext {
        SessionContext::from_generator(BackendKind::OpenAi, Arc::new(Canned("hello")))
    }

    #[test]
    fn turns_append_user_then_assistant() {
        let mut session = session();

        let turn = session.begin_turn("hi");
        assert_eq!(turn.prompt, "hi");
        assert!(turn.history.is_empty(), "prompt must not be in its own history");
        session.complete_turn("hello".to_string());

        let turn = session.begin_turn("how are you");
        assert_eq!(turn.history.len(), 2);
        assert!(turn.history[0].is_user());
        assert!(turn.history[1].is_assistant());
        session.complete_turn("fine".to_string());

        assert_eq!(session.history().len(), 4);
    }

    #[test]
    fn failed_turns_leave_the_session_usable() {
        let mut session = session();
        session.begin_turn("hi");
        // No reply arrived; the UI records the failure instead.
        session.push_notice(Message::app_error("request failed: connection refused"));

        let turn = session.begin_turn("again");
        // The notice is in the transcript but carries no wire role.
        assert_eq!(turn.history.len(), 2);
        assert!(turn.history[1].is_app());
    }

    #[tokio::test]
    async fn switching_kind_replaces_adapter_and_clears_history() {
        let mut session = session();
        session.begin_turn("hi");
        session.complete_turn("hello".to_string());
        assert_eq!(session.history().len(), 2);

        let config = BackendConfig::default().with_api_key("key");
        session
            .switch_backend(BackendKind::Gemini, &config)
            .await
            .unwrap();
        assert_eq!(session.kind(), BackendKind::Gemini);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn reconfiguring_the_same_kind_keeps_history() {
        let mut session = session();
        session.begin_turn("hi");
        session.complete_turn("hello".to_string());

        let config = BackendConfig::default()
            .with_api_key("key")
            .with_model("gpt-4o");
        session
            .switch_backend(BackendKind::OpenAi, &config)
            .await
            .unwrap();
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn failed_switch_leaves_the_session_untouched() {
        let mut session = session();
        session.begin_turn("hi");
        session.complete_turn("hello".to_string());

        // Missing api_key: construction fails before anything is replaced.
        let err = session
            .switch_backend(BackendKind::Gemini, &BackendConfig::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ConfigurationError::MissingField { .. }));
        assert_eq!(session.kind(), BackendKind::OpenAi);
        assert_eq!(session.history().len(), 2);
    }
}
