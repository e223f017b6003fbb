// src/api.rs

use crate::blacklist::{self, BlacklistVerdict};
use crate::error::{AppError, Result};
use crate::key_manager::{KeyManager, KeySnapshot};
use crate::state::AppState;
use crate::upstream::{self, ProbeResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Well-known public resolvers used to exercise the rotation end to end.
pub const SELF_TEST_TARGETS: [&str; 4] = ["8.8.8.8", "1.1.1.1", "208.67.222.222", "9.9.9.9"];

const SELF_TEST_PAUSE: Duration = Duration::from_millis(100);

// --- Router Definition ---

/// JSON API routes under `/api`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/check-blacklist", post(check_blacklist))
            .route("/stats", get(get_stats))
            .route("/test-all-keys", get(test_all_keys))
            .route("/test-key", post(test_key)),
    )
}

// --- Request/Response Structs ---

#[derive(Debug, Deserialize)]
pub struct CheckBlacklistRequest {
    pub ips: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckBlacklistResponse {
    pub results: Vec<BlacklistVerdict>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_requests: u64,
    pub active_keys: usize,
    pub rate_limited_keys: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub total_keys: usize,
    pub available_keys: usize,
    pub blocked_keys: usize,
    pub key_details: Vec<KeySnapshot>,
    pub summary: StatsSummary,
}

impl StatsReport {
    /// Collects the manager's counters and per-key snapshots into one report.
    pub fn collect(manager: &KeyManager) -> Self {
        let key_details = manager.get_statistics();
        let total_keys = manager.get_total_keys();
        let available_keys = manager.get_available_keys();
        let rate_limited_keys = key_details.iter().filter(|k| k.is_blocked).count();

        Self {
            total_keys,
            available_keys,
            blocked_keys: total_keys.saturating_sub(available_keys),
            summary: StatsSummary {
                total_requests: key_details.iter().map(|k| u64::from(k.request_count)).sum(),
                active_keys: key_details.len() - rate_limited_keys,
                rate_limited_keys,
            },
            key_details,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestResult {
    pub ip: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    pub success: bool,
    pub message: String,
    pub keys_used_in_test: usize,
    pub test_results: Vec<SelfTestResult>,
    pub stats: StatsReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub total_keys: usize,
    pub available_keys: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

// --- Route Handlers ---

/// Checks every submitted IP in sequence and returns one verdict per IP.
#[axum::debug_handler]
pub async fn check_blacklist(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CheckBlacklistRequest>, JsonRejection>,
) -> Result<Json<CheckBlacklistResponse>> {
    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "Rejected blacklist check request");
        AppError::RequestBody("Invalid IP list provided".to_string())
    })?;

    info!(ip_count = request.ips.len(), "Checking IP batch against blacklists");
    let results =
        blacklist::check_batch(&state.key_manager, &request.ips, state.batch_delay()).await;
    Ok(Json(CheckBlacklistResponse { results }))
}

#[axum::debug_handler]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsReport> {
    Json(StatsReport::collect(&state.key_manager))
}

/// Runs a lookup for each self-test target through the normal rotation.
#[axum::debug_handler]
pub async fn test_all_keys(State(state): State<Arc<AppState>>) -> Result<Json<SelfTestReport>> {
    let manager = &state.key_manager;
    if manager.get_total_keys() == 0 {
        return Err(AppError::NoCredentialsConfigured);
    }
    info!(total_keys = manager.get_total_keys(), "Testing all configured API keys");

    let mut test_results = Vec::with_capacity(SELF_TEST_TARGETS.len());
    for (position, ip) in SELF_TEST_TARGETS.iter().enumerate() {
        if position > 0 {
            tokio::time::sleep(SELF_TEST_PAUSE).await;
        }
        let result = match manager.request(ip).await {
            Ok(outcome) => SelfTestResult {
                ip: ip.to_string(),
                success: true,
                used_key: Some(outcome.used_key_preview),
                error: None,
            },
            Err(e) => SelfTestResult {
                ip: ip.to_string(),
                success: false,
                used_key: None,
                error: Some(e.to_string()),
            },
        };
        test_results.push(result);
    }

    let succeeded = test_results.iter().filter(|r| r.success).count();
    let keys_used_in_test = test_results
        .iter()
        .filter_map(|r| r.used_key.as_deref())
        .collect::<BTreeSet<_>>()
        .len();

    Ok(Json(SelfTestReport {
        success: true,
        message: format!(
            "Successfully tested {succeeded}/{} requests",
            SELF_TEST_TARGETS.len()
        ),
        keys_used_in_test,
        test_results,
        stats: StatsReport::collect(manager),
    }))
}

/// Probes a key supplied by the caller. The key does not join the rotation.
#[axum::debug_handler]
pub async fn test_key(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TestKeyRequest>, JsonRejection>,
) -> Result<Json<ProbeResult>> {
    let Json(request) = payload.map_err(|e| AppError::RequestBody(e.body_text()))?;
    if request.api_key.trim().is_empty() {
        return Err(AppError::RequestBody("Invalid API key provided".to_string()));
    }

    let manager = &state.key_manager;
    let result = upstream::probe_key(
        manager.client(),
        manager.endpoints(),
        manager.processor(),
        &SecretString::new(request.api_key),
    )
    .await;
    Ok(Json(result))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        total_keys: state.key_manager.get_total_keys(),
        available_keys: state.key_manager.get_available_keys(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
