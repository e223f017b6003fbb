// src/state.rs

use crate::config::AppConfig;
use crate::error::Result;
use crate::key_manager::KeyManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared application state handed to every Axum handler.
///
/// Owns the single `KeyManager` of the process; there is no global instance.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub key_manager: Arc<KeyManager>,
    pub start_time: Instant,
}

impl AppState {
    /// Builds the state, creating the HTTP client and the key manager from `config`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        info!("Creating shared AppState: initializing KeyManager and HTTP client...");
        let key_manager = KeyManager::from_config(config)?;
        Ok(Self::with_manager(config.clone(), Arc::new(key_manager)))
    }

    /// Wraps an already constructed manager.
    pub fn with_manager(config: AppConfig, key_manager: Arc<KeyManager>) -> Self {
        Self {
            config,
            key_manager,
            start_time: Instant::now(),
        }
    }

    /// Pause between lookups of one batch.
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.config.batch.delay_ms)
    }
}
