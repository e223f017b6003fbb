// src/config/loader.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

const ENV_API_KEY: &str = "MXTOOLBOX_API_KEY";
const ENV_API_KEY_PREFIX: &str = "MXTOOLBOX_API_KEY_";
const ENV_MAX_REQUESTS: &str = "MXTOOLBOX_MAX_REQUESTS_PER_KEY";
const ENV_PORT: &str = "PORT";

/// Load configuration from file (optional) and environment variables, then validate.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    override_with_env(&mut config);

    ConfigValidator::validate(&config)?;

    if config.api_keys.is_empty() {
        warn!("No MXToolbox API keys configured; every lookup will fail until keys are provided");
    }

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        warn!("Config file '{}' is empty. Using defaults.", config_path.display());
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(&content)?)
}

/// Collects `MXTOOLBOX_API_KEY_1..N`, stopping at the first missing index.
/// The unnumbered `MXTOOLBOX_API_KEY` stands in for index 1.
pub fn api_keys_from_env() -> Vec<String> {
    let mut keys = Vec::new();
    for index in 1.. {
        let numbered = std::env::var(format!("{ENV_API_KEY_PREFIX}{index}")).ok();
        let value = match numbered {
            Some(v) => Some(v),
            None if index == 1 => std::env::var(ENV_API_KEY).ok(),
            None => None,
        };
        match value.map(|v| v.trim().to_string()) {
            Some(key) if !key.is_empty() => keys.push(key),
            _ => break,
        }
    }
    keys
}

fn override_with_env(config: &mut AppConfig) {
    let env_keys = api_keys_from_env();
    if !env_keys.is_empty() {
        info!(
            config.total_keys = env_keys.len(),
            "Loaded MXToolbox API keys from environment"
        );
        config.api_keys = env_keys;
    }

    if let Ok(max_str) = std::env::var(ENV_MAX_REQUESTS) {
        match max_str.trim().parse::<u32>() {
            Ok(max) => {
                info!("Overriding max requests per key from environment: {}", max);
                config.rotation.max_requests_per_key = max;
            }
            Err(_) => warn!("Invalid {} environment variable: {}", ENV_MAX_REQUESTS, max_str),
        }
    }

    if let Ok(port_str) = std::env::var(ENV_PORT) {
        if let Ok(port) = port_str.parse::<u16>() {
            info!("Overriding server port from environment variable: {}", port);
            config.server.port = port;
        } else {
            warn!("Invalid PORT environment variable: {}", port_str);
        }
    }
}
