// src/handlers/invalid_api_key.rs

use super::base::{Action, ResponseHandler};
use reqwest::StatusCode;

pub struct InvalidApiKeyHandler;

impl ResponseHandler for InvalidApiKeyHandler {
    fn handle(&self, status: StatusCode) -> Option<Action> {
        if status == StatusCode::UNAUTHORIZED {
            Some(Action::AbortInvalidCredential)
        } else {
            None
        }
    }
}
