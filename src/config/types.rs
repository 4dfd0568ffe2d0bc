use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    /// Config format version; only `1` is understood
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    /// Model used when `--model` is not given; falls back to the first model
    /// the backend lists.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ServerConfig {
    /// Base URL of the research backend's HTTP API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Push channel base URL; derived from `base_url` when unset
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Per-request timeout for backend calls
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
            timeout_sec: default_timeout_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ChannelConfig {
    /// Reconnect the push channel once answers are accepted. The backend
    /// starts executing research when a channel connects.
    #[serde(default = "default_true")]
    pub reopen_after_answers: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reopen_after_answers: default_true(),
        }
    }
}
