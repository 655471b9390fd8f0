//! Configuration management for Chatgate.
//!
//! Values are layered, later sources winning:
//!
//! 1. compiled defaults
//! 2. an optional YAML file
//! 3. `CHATGATE_<SECTION>__<KEY>` environment variables
//! 4. the conventional variable names (`MAX_REQUESTS_PER_SESSION`, `PORT`,
//!    `AZURE_OPENAI_ENDPOINT`, ...)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::ratelimit::{CompactorConfig, Limits, TimeWindow};

/// Main configuration for the Chatgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Chat endpoint configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// The socket address the HTTP server binds.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            GatewayError::Config(format!("invalid server.host '{}': {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Lifetime request quota per session
    #[serde(default = "default_max_requests_per_session")]
    pub max_requests_per_session: u64,

    /// Request quota per client IP per minute
    #[serde(default = "default_max_requests_per_ip_per_minute")]
    pub max_requests_per_ip_per_minute: u64,

    /// Request quota per client IP per hour
    #[serde(default = "default_max_requests_per_ip_per_hour")]
    pub max_requests_per_ip_per_hour: u64,

    /// Request quota across all clients per minute
    #[serde(default = "default_global_max_requests_per_minute")]
    pub global_max_requests_per_minute: u64,

    /// Seconds between compaction sweeps
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_secs: u64,

    /// Seconds per-IP timestamps are retained
    #[serde(default = "default_ip_retention")]
    pub ip_retention_secs: u64,

    /// Seconds global timestamps are retained
    #[serde(default = "default_global_retention")]
    pub global_retention_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests_per_session: default_max_requests_per_session(),
            max_requests_per_ip_per_minute: default_max_requests_per_ip_per_minute(),
            max_requests_per_ip_per_hour: default_max_requests_per_ip_per_hour(),
            global_max_requests_per_minute: default_global_max_requests_per_minute(),
            compaction_interval_secs: default_compaction_interval(),
            ip_retention_secs: default_ip_retention(),
            global_retention_secs: default_global_retention(),
        }
    }
}

impl RateLimitingConfig {
    /// The quotas enforced by the limiter.
    pub fn limits(&self) -> Limits {
        Limits {
            max_requests_per_session: self.max_requests_per_session,
            max_requests_per_ip_per_minute: self.max_requests_per_ip_per_minute,
            max_requests_per_ip_per_hour: self.max_requests_per_ip_per_hour,
            global_max_requests_per_minute: self.global_max_requests_per_minute,
        }
    }

    /// Compactor schedule and retention.
    pub fn compactor(&self) -> CompactorConfig {
        CompactorConfig {
            interval: Duration::from_secs(self.compaction_interval_secs),
            origin_retention: Duration::from_secs(self.ip_retention_secs),
            global_retention: Duration::from_secs(self.global_retention_secs),
        }
    }
}

fn default_max_requests_per_session() -> u64 {
    Limits::default().max_requests_per_session
}

fn default_max_requests_per_ip_per_minute() -> u64 {
    Limits::default().max_requests_per_ip_per_minute
}

fn default_max_requests_per_ip_per_hour() -> u64 {
    Limits::default().max_requests_per_ip_per_hour
}

fn default_global_max_requests_per_minute() -> u64 {
    Limits::default().global_max_requests_per_minute
}

fn default_compaction_interval() -> u64 {
    60
}

fn default_ip_retention() -> u64 {
    TimeWindow::Hour.duration().as_secs()
}

fn default_global_retention() -> u64 {
    TimeWindow::Minute.duration().as_secs()
}

/// Chat endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Longest accepted message, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Value of the `Retry-After` header on 429 responses
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,

    /// Plain-text knowledge document the assistant answers from
    #[serde(default = "default_knowledge_path")]
    pub knowledge_path: String,

    /// Brand the assistant speaks for
    #[serde(default = "default_brand")]
    pub brand: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            retry_after_secs: default_retry_after(),
            knowledge_path: default_knowledge_path(),
            brand: default_brand(),
        }
    }
}

fn default_max_message_length() -> usize {
    2000
}

fn default_retry_after() -> u64 {
    60
}

fn default_knowledge_path() -> String {
    "knowledge.txt".to_string()
}

fn default_brand() -> String {
    "LunaGlow".to_string()
}

/// Azure OpenAI configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// API key; never serialized
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Deployment name
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// REST API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: default_deployment(),
            api_version: default_api_version(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

fn default_deployment() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_version() -> String {
    "2024-12-01-preview".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

/// How an environment variable's value is handed to the config builder.
#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Integer,
    Text,
}

/// A conventional environment variable (with aliases) mapped onto a config key.
struct EnvOverride {
    vars: &'static [&'static str],
    key: &'static str,
    kind: ValueKind,
}

const ENV_OVERRIDES: &[EnvOverride] = &[
    EnvOverride {
        vars: &["PORT"],
        key: "server.port",
        kind: ValueKind::Integer,
    },
    EnvOverride {
        vars: &["MAX_REQUESTS_PER_SESSION"],
        key: "rate_limiting.max_requests_per_session",
        kind: ValueKind::Integer,
    },
    EnvOverride {
        vars: &["MAX_REQUESTS_PER_IP_PER_MINUTE"],
        key: "rate_limiting.max_requests_per_ip_per_minute",
        kind: ValueKind::Integer,
    },
    EnvOverride {
        vars: &["MAX_REQUESTS_PER_IP_PER_HOUR"],
        key: "rate_limiting.max_requests_per_ip_per_hour",
        kind: ValueKind::Integer,
    },
    EnvOverride {
        vars: &["GLOBAL_MAX_REQUESTS_PER_MINUTE"],
        key: "rate_limiting.global_max_requests_per_minute",
        kind: ValueKind::Integer,
    },
    EnvOverride {
        vars: &["MAX_MESSAGE_LENGTH"],
        key: "chat.max_message_length",
        kind: ValueKind::Integer,
    },
    EnvOverride {
        vars: &["KNOWLEDGE_PATH"],
        key: "chat.knowledge_path",
        kind: ValueKind::Text,
    },
    EnvOverride {
        vars: &["AZURE_OPENAI_ENDPOINT", "AZURE_ENDPOINT"],
        key: "llm.endpoint",
        kind: ValueKind::Text,
    },
    EnvOverride {
        vars: &["AZURE_OPENAI_API_KEY", "AZURE_API_KEY"],
        key: "llm.api_key",
        kind: ValueKind::Text,
    },
    EnvOverride {
        vars: &["AZURE_OPENAI_DEPLOYMENT", "AZURE_DEPLOYMENT"],
        key: "llm.deployment",
        kind: ValueKind::Text,
    },
    EnvOverride {
        vars: &["AZURE_OPENAI_API_VERSION", "AZURE_API_VERSION"],
        key: "llm.api_version",
        kind: ValueKind::Text,
    },
];

impl GatewayConfig {
    /// Load configuration from an optional YAML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::load_from(path, &vars)
    }

    /// Load configuration from an optional YAML file and the given variables.
    pub fn load_from(path: Option<&Path>, vars: &HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CHATGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.clone())),
        );

        for entry in ENV_OVERRIDES {
            let Some((var, raw)) = entry
                .vars
                .iter()
                .find_map(|var| vars.get(*var).map(|value| (*var, value.trim())))
            else {
                continue;
            };

            builder = match entry.kind {
                ValueKind::Integer => {
                    let value: i64 = raw.parse().map_err(|_| {
                        GatewayError::Config(format!("{} must be an integer, got '{}'", var, raw))
                    })?;
                    builder.set_override(entry.key, value)?
                }
                ValueKind::Text => builder.set_override(entry.key, raw.to_string())?,
            };
        }

        let config: GatewayConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as YAML. The API key is omitted.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.compaction_interval_secs == 0 {
            return Err(GatewayError::Config(
                "rate_limiting.compaction_interval_secs must be positive".to_string(),
            ));
        }
        if rl.ip_retention_secs < TimeWindow::Hour.duration().as_secs() {
            return Err(GatewayError::Config(
                "rate_limiting.ip_retention_secs must cover the hourly window".to_string(),
            ));
        }
        if rl.global_retention_secs < TimeWindow::Minute.duration().as_secs() {
            return Err(GatewayError::Config(
                "rate_limiting.global_retention_secs must cover the minute window".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(GatewayError::Config(
                "chat.max_message_length must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(GatewayError::Config(
                "llm.temperature must be between 0 and 2".to_string(),
            ));
        }
        self.server.listen_addr()?;
        Ok(())
    }
}
