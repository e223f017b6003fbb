// src/config/validation.rs

use crate::config::app::{key_preview, TARGET_PLACEHOLDER};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_keys(config) {
            warn!("API key validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_rotation(config) {
            warn!("Rotation config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_endpoints(config) {
            warn!("Upstream endpoint validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_keys(config: &AppConfig) -> Result<()> {
        let mut seen = HashSet::new();
        for key in &config.api_keys {
            if key.trim().is_empty() {
                return Err(AppError::Config("API key list contains an empty key".to_string()));
            }
            // One slot per credential: a repeated key would share its quota across two slots.
            if !seen.insert(key.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate API key configured: {}",
                    key_preview(key)
                )));
            }
        }
        debug!("Validated {} API keys", seen.len());
        Ok(())
    }

    fn validate_rotation(config: &AppConfig) -> Result<()> {
        if config.rotation.max_requests_per_key == 0 {
            return Err(AppError::Config(
                "rotation.max_requests_per_key must be greater than 0".to_string(),
            ));
        }
        if config.rotation.block_duration_secs == 0 {
            return Err(AppError::Config(
                "rotation.block_duration_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_endpoints(config: &AppConfig) -> Result<()> {
        if config.upstream.endpoints.is_empty() {
            return Err(AppError::Config(
                "At least one upstream endpoint must be configured".to_string(),
            ));
        }

        for template in &config.upstream.endpoints {
            if !template.contains(TARGET_PLACEHOLDER) {
                return Err(AppError::Config(format!(
                    "Endpoint '{template}' is missing the {TARGET_PLACEHOLDER} placeholder"
                )));
            }
            let sample = template.replace(TARGET_PLACEHOLDER, "127.0.0.1");
            let url = Url::parse(&sample).map_err(|e| {
                AppError::Config(format!("Invalid endpoint URL '{template}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "Unsupported scheme '{}' in endpoint '{template}'",
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }
        if config.server.connect_timeout_secs == 0 {
            return Err(AppError::Config("Connect timeout cannot be 0".to_string()));
        }
        if config.server.request_timeout_secs == 0 {
            return Err(AppError::Config("Request timeout cannot be 0".to_string()));
        }
        Ok(())
    }
}
