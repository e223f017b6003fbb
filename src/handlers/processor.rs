// src/handlers/processor.rs

use super::{
    base::{Action, ResponseHandler},
    invalid_api_key::InvalidApiKeyHandler,
    permission_denied::PermissionDeniedHandler,
    rate_limit::RateLimitHandler,
    success::SuccessHandler,
};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::trace;

/// Runs an upstream status through a chain of handlers.
#[derive(Clone)]
pub struct ResponseProcessor {
    handlers: Arc<Vec<Box<dyn ResponseHandler>>>,
}

impl ResponseProcessor {
    /// Creates a new `ResponseProcessor` with a given chain of handlers.
    pub fn new(handlers: Vec<Box<dyn ResponseHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// First handler to claim the status decides; unclaimed statuses move on to the
    /// next endpoint variant.
    pub fn decide(&self, status: StatusCode) -> Action {
        let action = self
            .handlers
            .iter()
            .find_map(|handler| handler.handle(status))
            .unwrap_or(Action::TryNextEndpoint);
        trace!(http.status_code = status.as_u16(), ?action, "Classified upstream response");
        action
    }
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SuccessHandler),
            Box::new(RateLimitHandler),
            Box::new(InvalidApiKeyHandler),
            Box::new(PermissionDeniedHandler),
        ])
    }
}

impl std::fmt::Debug for ResponseProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseProcessor")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
