// src/handlers/success.rs

use super::base::{Action, ResponseHandler};
use reqwest::StatusCode;

pub struct SuccessHandler;

impl ResponseHandler for SuccessHandler {
    fn handle(&self, status: StatusCode) -> Option<Action> {
        status.is_success().then_some(Action::Accept)
    }
}
