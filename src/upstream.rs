// src/upstream.rs

use crate::config::{app::TARGET_PLACEHOLDER, key_preview, AppConfig};
use crate::error::{AppError, Result};
use crate::handlers::{Action, ResponseProcessor};
use reqwest::{header, Client, ClientBuilder, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Target used when probing a key: a public resolver that is never listed.
pub const PROBE_TARGET: &str = "8.8.8.8";

/// Builds the shared HTTP client for lookups.
pub fn build_http_client(config: &AppConfig) -> Result<Client> {
    let configure_builder = |builder: ClientBuilder| -> ClientBuilder {
        builder
            .connect_timeout(Duration::from_secs(config.server.connect_timeout_secs))
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(config.upstream.user_agent.clone())
    };

    let client = configure_builder(Client::builder())
        .build()
        .map_err(AppError::HttpClientBuild)?;
    info!(
        timeout_secs = config.server.request_timeout_secs,
        "Upstream HTTP client created successfully."
    );
    Ok(client)
}

/// Ordered list of lookup URL templates; alternates tolerate host and path-case
/// differences in the upstream API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    templates: Vec<String>,
}

impl Endpoints {
    pub fn new(templates: Vec<String>) -> Self {
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Concrete URLs for `target`, in trial order. The target is inserted verbatim.
    pub fn urls_for(&self, target: &str) -> Vec<String> {
        self.templates
            .iter()
            .map(|t| t.replace(TARGET_PLACEHOLDER, target))
            .collect()
    }
}

/// GET request for one endpoint variant, authenticated with `api_key`.
pub fn lookup_request(client: &Client, url: &str, api_key: &SecretString) -> RequestBuilder {
    client
        .get(url)
        .header(header::AUTHORIZATION, api_key.expose_secret())
        .header(header::CONTENT_TYPE, "application/json")
}

/// Outcome of testing a single key outside the rotation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_ip: Option<String>,
}

impl ProbeResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            key_preview: None,
            test_ip: None,
        }
    }
}

/// Checks whether `api_key` works, using at most the first two endpoint variants.
///
/// The key is not part of any rotation; nothing is recorded.
pub async fn probe_key(
    client: &Client,
    endpoints: &Endpoints,
    processor: &ResponseProcessor,
    api_key: &SecretString,
) -> ProbeResult {
    let preview = key_preview(api_key.expose_secret());

    for url in endpoints.urls_for(PROBE_TARGET).iter().take(2) {
        debug!(api_key.preview = %preview, endpoint = %url, "Probing API key");
        let response = match lookup_request(client, url, api_key).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(api_key.preview = %preview, endpoint = %url, error = %e, "Probe request failed");
                continue;
            }
        };

        let status = response.status();
        match processor.decide(status) {
            Action::Accept => match response.json::<Value>().await {
                Ok(_) => {
                    return ProbeResult {
                        success: true,
                        message: Some("API key is valid and working".to_string()),
                        error: None,
                        key_preview: Some(preview),
                        test_ip: Some(PROBE_TARGET.to_string()),
                    };
                }
                Err(e) => {
                    warn!(api_key.preview = %preview, endpoint = %url, error = %e, "Probe response body is not JSON");
                }
            },
            Action::AbortInvalidCredential => {
                return ProbeResult::failure(
                    "Invalid API key - please check your MXToolbox API key",
                );
            }
            Action::AbortInsufficientPermission => {
                return ProbeResult::failure(
                    "API key doesn't have permission for blacklist lookups",
                );
            }
            Action::BlockKeyAndTryNext => {
                return ProbeResult::failure(
                    "Rate limit exceeded - please wait before testing again",
                );
            }
            Action::TryNextEndpoint => {
                debug!(
                    api_key.preview = %preview,
                    http.status_code = status.as_u16(),
                    "Probe endpoint answered with an unusable status"
                );
            }
        }
    }

    ProbeResult::failure("Unable to verify API key - all endpoints failed")
}
