//! Conversational agent behind the chat endpoint.
//!
//! A [`ChatModel`] turns a message list into an answer. Each session owns a
//! [`Conversation`] holding the system prompt and its history; the
//! [`SessionRegistry`] creates them lazily and forgets them when a session is
//! cleared.

mod azure;
mod conversation;
pub mod knowledge;
#[cfg(test)]
pub(crate) mod test_support;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use azure::AzureOpenAiClient;
pub use conversation::{Conversation, SessionRegistry};

/// Errors raised while talking to the language model.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Azure OpenAI configuration incomplete: {0}")]
    MissingConfig(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM API returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Unexpected LLM response: {0}")]
    Response(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A hosted language model that completes a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the assistant's reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError>;
}
