// src/handlers/base.rs

use reqwest::StatusCode;

/// What the lookup loop should do after one endpoint variant answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Usable response: parse the body and return it to the caller.
    Accept,
    /// The key hit the upstream rate limit. Block it, then try the next variant.
    BlockKeyAndTryNext,
    /// The key itself was rejected. Stop, no other variant will accept it.
    AbortInvalidCredential,
    /// The key is valid but may not perform blacklist lookups. Stop.
    AbortInsufficientPermission,
    /// Anything else: log it and move on to the next endpoint variant.
    TryNextEndpoint,
}

/// A trait for handling responses from the upstream service.
/// Each implementation is responsible for a specific case (e.g., success, rate limit).
pub trait ResponseHandler: Send + Sync {
    /// Returns `Some(Action)` if this handler recognises the status, `None` to let the
    /// next handler in the chain decide.
    fn handle(&self, status: StatusCode) -> Option<Action>;
}
