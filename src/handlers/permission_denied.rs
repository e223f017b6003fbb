// src/handlers/permission_denied.rs

use super::base::{Action, ResponseHandler};
use reqwest::StatusCode;

/// MXToolbox answers 403 when the key's plan does not include blacklist lookups.
pub struct PermissionDeniedHandler;

impl ResponseHandler for PermissionDeniedHandler {
    fn handle(&self, status: StatusCode) -> Option<Action> {
        if status == StatusCode::FORBIDDEN {
            Some(Action::AbortInsufficientPermission)
        } else {
            None
        }
    }
}
