//! Azure OpenAI chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AgentError, ChatMessage, ChatModel};
use crate::config::LlmConfig;

/// Client for an Azure OpenAI chat deployment.
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f32,
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("url", &self.url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    /// Build a client from configuration.
    ///
    /// Fails if the endpoint or API key is missing.
    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                AgentError::MissingConfig(
                    "set AZURE_OPENAI_ENDPOINT (or AZURE_ENDPOINT)".to_string(),
                )
            })?;
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AgentError::MissingConfig("set AZURE_OPENAI_API_KEY (or AZURE_API_KEY)".to_string())
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AgentError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            url: completions_url(endpoint, &config.deployment, &config.api_version),
            api_key: api_key.to_string(),
            temperature: config.temperature,
        })
    }

    /// The chat completions URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatModel for AzureOpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        debug!(messages = messages.len(), "Sending chat completion request");

        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&CompletionRequest {
                messages,
                temperature: self.temperature,
            })
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Chat completion request rejected");
            return Err(AgentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

fn parse_completion(body: &str) -> Result<String, AgentError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| AgentError::Response(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AgentError::Response("no message content in completion".to_string()))
}
