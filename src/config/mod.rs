// src/config/mod.rs

pub mod app;
pub mod loader;
pub mod validation;

pub use app::{key_preview, AppConfig, BatchConfig, RotationConfig, ServerConfig, UpstreamConfig};
pub use loader::{api_keys_from_env, load_config};
pub use validation::ConfigValidator;
