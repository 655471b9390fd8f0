//! Error types for the Chatgate service.

use thiserror::Error;

use crate::agent::AgentError;

/// Main error type for Chatgate operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Language model and conversation errors
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}

/// Result type alias for Chatgate operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    fn build_client(llm: &LlmConfig) -> Result<crate::agent::AzureOpenAiClient> {
        Ok(crate::agent::AzureOpenAiClient::from_config(llm)?)
    }

    #[test]
    fn test_agent_errors_propagate_as_agent_variant() {
        let err = build_client(&LlmConfig::default()).unwrap_err();

        assert!(matches!(err, GatewayError::Agent(AgentError::MissingConfig(_))));
        assert!(err.to_string().starts_with("Agent error: Azure OpenAI configuration incomplete"));
    }

    #[test]
    fn test_config_errors_are_wrapped() {
        let err: GatewayError = config::ConfigError::Message("bad key".to_string()).into();
        assert_eq!(err.to_string(), "Configuration error: bad key");
    }
}
