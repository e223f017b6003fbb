// src/handlers/mod.rs

pub mod base;
pub mod invalid_api_key;
pub mod permission_denied;
pub mod processor;
pub mod rate_limit;
pub mod success;

pub use base::{Action, ResponseHandler};
pub use processor::ResponseProcessor;
