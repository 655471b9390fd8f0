//! Per-session conversation history.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AgentError, ChatMessage, ChatModel};

/// A system prompt plus the user/assistant turns exchanged so far.
#[derive(Debug, Clone)]
pub struct Conversation {
    system: ChatMessage,
    history: Vec<ChatMessage>,
}

impl Conversation {
    /// Start a conversation with the given system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system: ChatMessage::system(system_prompt),
            history: Vec::new(),
        }
    }

    /// Ask a question. Both turns are kept only if the model answers.
    pub async fn ask(
        &mut self,
        model: &dyn ChatModel,
        question: &str,
    ) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(self.system.clone());
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(question));

        let answer = model.complete(&messages).await?;

        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer.clone()));
        Ok(answer)
    }

    /// Turns exchanged so far, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

/// Lazily created conversations keyed by session id.
pub struct SessionRegistry {
    model: Arc<dyn ChatModel>,
    system_prompt: Arc<str>,
    sessions: DashMap<String, Arc<Mutex<Conversation>>>,
}

impl SessionRegistry {
    /// Create a registry whose conversations share one model and system prompt.
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<Arc<str>>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            sessions: DashMap::new(),
        }
    }

    /// Ask a question within a session, creating the conversation if needed.
    ///
    /// Requests for the same session are answered one at a time so history
    /// stays in order.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<String, AgentError> {
        let conversation = {
            let entry = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    info!(session = %session_id, "Starting conversation");
                    Arc::new(Mutex::new(Conversation::new(self.system_prompt.as_ref())))
                });
            Arc::clone(entry.value())
        };

        let mut conversation = conversation.lock().await;
        debug!(session = %session_id, turns = conversation.history().len(), "Asking model");
        conversation.ask(self.model.as_ref(), question).await
    }

    /// Forget a session's conversation. Returns `false` if there was none.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Whether a session has a conversation.
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of live conversations.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{EchoModel, FailingModel};

    #[tokio::test]
    async fn test_conversation_sends_system_history_and_question() {
        let model = EchoModel::default();
        let mut conversation = Conversation::new("system prompt");

        assert_eq!(conversation.ask(&model, "first").await.unwrap(), "echo: first");
        conversation.ask(&model, "second").await.unwrap();

        let calls = model.calls.lock();
        assert_eq!(calls[0].len(), 2);
        assert_eq!(
            calls[1],
            vec![
                ChatMessage::system("system prompt"),
                ChatMessage::user("first"),
                ChatMessage::assistant("echo: first"),
                ChatMessage::user("second"),
            ]
        );
        assert_eq!(conversation.history().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_turn_is_not_kept() {
        let mut conversation = Conversation::new("system prompt");

        assert!(conversation.ask(&FailingModel, "hello").await.is_err());
        assert!(conversation.history().is_empty());
    }

    #[tokio::test]
    async fn test_registry_keeps_sessions_apart() {
        let model = Arc::new(EchoModel::default());
        let registry = SessionRegistry::new(model.clone(), "prompt");

        registry.ask("a", "one").await.unwrap();
        registry.ask("a", "two").await.unwrap();
        registry.ask("b", "three").await.unwrap();

        assert_eq!(registry.len(), 2);
        let calls = model.calls.lock();
        // third call belongs to a fresh conversation
        assert_eq!(calls[2].len(), 2);
        assert_eq!(calls[1].len(), 4);
    }

    #[tokio::test]
    async fn test_registry_remove() {
        let registry = SessionRegistry::new(Arc::new(EchoModel::default()), "prompt");
        registry.ask("a", "hi").await.unwrap();

        assert!(registry.contains("a"));
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(registry.is_empty());
    }
}
