// src/config/app.rs

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the lookup target in endpoint templates.
pub const TARGET_PLACEHOLDER: &str = "{target}";

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Per-key quota and cool-down settings for the rotation manager.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RotationConfig {
    /// Calls a key may serve before selection moves on to the next key.
    #[serde(default = "default_max_requests_per_key")]
    pub max_requests_per_key: u32,
    /// How long a key stays blocked after the upstream answers 429.
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_requests_per_key: default_max_requests_per_key(),
            block_duration_secs: default_block_duration(),
        }
    }
}

/// Where and how lookups are sent.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// URL templates tried in order for every lookup. Each must contain `{target}`.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Pause between consecutive lookups of one batch, in milliseconds.
    #[serde(default = "default_batch_delay")]
    pub delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_batch_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// MXToolbox API keys, in rotation order. Usually supplied through
    /// `MXTOOLBOX_API_KEY_<n>` rather than the file.
    #[serde(default, skip_serializing)]
    pub api_keys: Vec<String>,
}

impl AppConfig {
    /// Redacted previews of the configured keys, safe for logs and CLI output.
    pub fn key_previews(&self) -> Vec<String> {
        self.api_keys.iter().map(|k| key_preview(k)).collect()
    }
}

/// First eight characters of a key followed by an ellipsis.
pub fn key_preview(key: &str) -> String {
    let head: String = key.chars().take(8).collect();
    format!("{head}...")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_requests_per_key() -> u32 {
    50
}

fn default_block_duration() -> u64 {
    60
}

fn default_endpoints() -> Vec<String> {
    vec![
        "https://mxtoolbox.com/api/v1/Lookup/blacklist/{target}".to_string(),
        "https://mxtoolbox.com/api/v1/lookup/blacklist/{target}".to_string(),
        "https://api.mxtoolbox.com/api/v1/Lookup/blacklist/{target}".to_string(),
    ]
}

fn default_user_agent() -> String {
    "IP-Blacklist-Checker/1.0".to_string()
}

fn default_batch_delay() -> u64 {
    500
}
