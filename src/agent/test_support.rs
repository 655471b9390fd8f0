//! Stub models for tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AgentError, ChatMessage, ChatModel};

/// Model that echoes the last message and records what it was sent.
#[derive(Default)]
pub(crate) struct EchoModel {
    pub(crate) calls: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        self.calls.lock().push(messages.to_vec());
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("echo: {}", last))
    }
}

/// Model that always fails.
pub(crate) struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, AgentError> {
        Err(AgentError::Api {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}
