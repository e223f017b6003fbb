// src/lib.rs

pub mod api;
pub mod blacklist;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod key_manager;
pub mod state;
pub mod upstream;

use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use blacklist::BlacklistVerdict;
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use key_manager::{KeyManager, KeySnapshot, LookupOutcome, RotationPolicy};
pub use state::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Creates the main Axum router for the application.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health_check))
        .merge(api::api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Middleware adding a request id and a tracing span to every request.
async fn trace_requests(
    mut req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        // A hyphenated uuid is always a valid header value.
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("X-Request-ID", value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Router with the request tracing middleware applied, ready to serve.
pub fn build_app(state: Arc<AppState>) -> Router {
    create_router(state).layer(axum::middleware::from_fn(trace_requests))
}

/// Sets up configuration and state, and builds the router.
pub async fn run(
    config_path_override: Option<PathBuf>,
    port_override: Option<u16>,
) -> std::result::Result<(Router, AppConfig), AppError> {
    info!("Starting IP blacklist checker...");

    let (mut app_config, _config_path) = setup_configuration(config_path_override)?;
    if let Some(port) = port_override {
        info!(server.port = port, "Overriding server port from command line");
        app_config.server.port = port;
    }

    let app_state = build_application_state(&app_config)?;
    let app = build_app(app_state);

    Ok((app, app_config))
}

/// `--config`, then `CONFIG_PATH`, then `config.yaml`.
pub fn resolve_config_path(config_path_override: Option<PathBuf>) -> PathBuf {
    config_path_override.unwrap_or_else(|| {
        std::env::var("CONFIG_PATH")
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    })
}

/// Loads, validates and logs the application configuration.
pub fn setup_configuration(
    config_path_override: Option<PathBuf>,
) -> Result<(AppConfig, PathBuf)> {
    let config_path = resolve_config_path(config_path_override);

    let config_path_display = config_path.display().to_string();
    if config_path.exists() {
        info!(config.path = %config_path_display, "Using configuration file");
    } else {
        info!(config.path = %config_path_display, "Optional configuration file not found. Using defaults and environment variables.");
    }

    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    info!(
        config.total_keys = app_config.api_keys.len(),
        config.endpoints.count = app_config.upstream.endpoints.len(),
        rotation.max_requests_per_key = app_config.rotation.max_requests_per_key,
        rotation.block_duration_secs = app_config.rotation.block_duration_secs,
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );

    Ok((app_config, config_path))
}

fn build_application_state(app_config: &AppConfig) -> Result<Arc<AppState>> {
    let app_state = AppState::new(app_config).map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;
    info!(
        rotation.max_requests_per_key = app_state.key_manager.max_requests_per_key(),
        rotation.block_duration_secs = app_state.key_manager.block_duration().as_secs(),
        "Application state initialized successfully."
    );
    Ok(Arc::new(app_state))
}

/// Output of the one-shot `check` command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub results: Vec<BlacklistVerdict>,
    pub key_statistics: Vec<KeySnapshot>,
}

/// Checks `ips` once with a fresh manager and reports the verdicts and key usage.
pub async fn check_ips(config: &AppConfig, ips: &[String]) -> Result<CheckReport> {
    let manager = KeyManager::from_config(config)?;
    info!(
        targets = ips.len(),
        rotation.max_requests_per_key = manager.max_requests_per_key(),
        rotation.block_duration_secs = manager.block_duration().as_secs(),
        "Checking targets"
    );
    let delay = std::time::Duration::from_millis(config.batch.delay_ms);
    let results = blacklist::check_batch(&manager, ips, delay).await;
    Ok(CheckReport {
        results,
        key_statistics: manager.get_statistics(),
    })
}

/// Secret-free view of a configuration, printed by the `config` command.
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub source: String,
    pub key_previews: Vec<String>,
    #[serde(flatten)]
    pub config: AppConfig,
}

/// Loads and validates the configuration at `path` (plus environment overrides) and
/// summarizes it.
pub fn summarize_config(path: &Path) -> Result<ConfigSummary> {
    let source = path.display().to_string();
    let config = config::load_config(path)?;
    Ok(ConfigSummary {
        source,
        key_previews: config.key_previews(),
        config,
    })
}
