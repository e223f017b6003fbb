// src/handlers/rate_limit.rs

use super::base::{Action, ResponseHandler};
use reqwest::StatusCode;

pub struct RateLimitHandler;

impl ResponseHandler for RateLimitHandler {
    fn handle(&self, status: StatusCode) -> Option<Action> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Some(Action::BlockKeyAndTryNext)
        } else {
            None
        }
    }
}
