//! Common test utilities and fixtures
#![allow(dead_code)]

use blacklist_checker::{
    config::AppConfig,
    key_manager::{KeyManager, RotationPolicy},
    upstream::Endpoints,
    AppState,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

/// Paths served by the mock upstream, one per endpoint variant, in trial order.
pub const PRIMARY_PATH: &str = "/api/v1/Lookup/blacklist";
pub const LOWERCASE_PATH: &str = "/api/v1/lookup/blacklist";
pub const ALTERNATE_PATH: &str = "/alt/api/v1/Lookup/blacklist";

/// Endpoint templates pointing at a mock server.
pub fn mock_endpoints(base_uri: &str) -> Vec<String> {
    [PRIMARY_PATH, LOWERCASE_PATH, ALTERNATE_PATH]
        .iter()
        .map(|p| format!("{base_uri}{p}/{{target}}"))
        .collect()
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.batch.delay_ms = 0;
        Self { config }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_keys.push(key.into());
        self
    }

    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.config.rotation.max_requests_per_key = max;
        self
    }

    pub fn with_upstream(mut self, base_uri: &str) -> Self {
        self.config.upstream.endpoints = mock_endpoints(base_uri);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager against a mock upstream with a custom rotation policy.
pub fn manager_with_policy(base_uri: &str, keys: &[&str], policy: RotationPolicy) -> KeyManager {
    KeyManager::new(
        keys.iter().map(|k| k.to_string()).collect(),
        policy,
        reqwest::Client::new(),
        Endpoints::new(mock_endpoints(base_uri)),
    )
}

/// Manager against a mock upstream with the given quota and a 60 s cool-down.
pub fn manager(base_uri: &str, keys: &[&str], max_requests_per_key: u32) -> KeyManager {
    manager_with_policy(
        base_uri,
        keys,
        RotationPolicy {
            max_requests_per_key,
            block_duration: Duration::from_secs(60),
        },
    )
}

pub fn app_state(config: &AppConfig) -> Arc<AppState> {
    Arc::new(AppState::new(config).expect("Failed to create AppState for test"))
}

/// Lookup payload with no listings.
pub fn clean_payload() -> Value {
    json!({
        "CommandType": "blacklist",
        "Information": [],
        "Failed": [],
        "Passed": [{"Name": "Spamhaus ZEN"}, {"Name": "Barracuda"}]
    })
}

/// Lookup payload listing the target on each of `names`.
pub fn listed_payload(names: &[&str]) -> Value {
    let failed: Vec<Value> = names.iter().map(|n| json!({"Name": n})).collect();
    json!({
        "CommandType": "blacklist",
        "Information": [],
        "Failed": failed,
        "Passed": []
    })
}

/// Test utilities for HTTP requests
pub mod http {
    use axum::{body::Body, http::Request};
    use serde_json::Value;

    pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub fn post_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

/// Test assertions and utilities
pub mod assertions {
    use axum::{body::to_bytes, response::Response};
    use serde_json::Value;

    pub async fn assert_json_response(response: Response, expected_status: u16) -> Value {
        assert_eq!(response.status().as_u16(), expected_status);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).expect("Response body should be valid JSON")
    }

    pub async fn assert_error_response(
        response: Response,
        expected_status: u16,
        error_type: &str,
    ) -> Value {
        let json = assert_json_response(response, expected_status).await;
        assert_eq!(
            json["error"]["type"].as_str(),
            Some(error_type),
            "Error type mismatch in {json}"
        );
        json
    }
}
