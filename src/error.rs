// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Structured error body returned by the HTTP API.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize, Debug)]
struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Every failure the checker can produce.
///
/// The first group is the lookup taxonomy returned by
/// [`KeyManager::request`](crate::key_manager::KeyManager::request); the rest are
/// startup and HTTP-surface errors. Variants that mention a key only ever carry its
/// redacted preview.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No MXToolbox API keys configured")]
    NoCredentialsConfigured,

    #[error("All MXToolbox API keys are rate limited. Please wait before making more requests.")]
    AllCredentialsExhausted,

    #[error("API key {key_preview} was rate limited by the upstream service")]
    RateLimited { key_preview: String },

    #[error("Invalid API key: {key_preview}")]
    InvalidCredential { key_preview: String },

    #[error("API key {key_preview} doesn't have permission for blacklist lookups")]
    InsufficientPermission { key_preview: String },

    #[error("All endpoints failed")]
    AllEndpointsFailed,

    #[error("Upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Failed to process upstream response body: {0}")]
    ResponseBody(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("HTTP client build error: {0}")]
    HttpClientBuild(#[source] reqwest::Error),

    #[error("Request body processing error: {0}")]
    RequestBody(String),
}

impl AppError {
    /// Whether a caller may reasonably retry the whole lookup later and hope for a
    /// different slot or a recovered upstream.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AllCredentialsExhausted
                | Self::RateLimited { .. }
                | Self::AllEndpointsFailed
                | Self::Upstream(_)
        )
    }

    fn to_status_and_details(&self) -> (StatusCode, ErrorDetails) {
        match self {
            // --- key rotation ---
            Self::NoCredentialsConfigured => {
                error!("Lookup attempted with no API keys configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "NO_CREDENTIALS".to_string(),
                        message: "No MXToolbox API keys configured".to_string(),
                        details: None,
                    },
                )
            }
            Self::AllCredentialsExhausted => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetails {
                    error_type: "ALL_KEYS_EXHAUSTED".to_string(),
                    message: "All API keys are rate limited. Please wait before making more requests."
                        .to_string(),
                    details: None,
                },
            ),
            Self::RateLimited { key_preview } => {
                warn!(api_key.preview = %key_preview, "Responding with rate limit error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorDetails {
                        error_type: "RATE_LIMITED".to_string(),
                        message: "Upstream service rate limited the request".to_string(),
                        details: Some(format!("Key {key_preview} is temporarily blocked")),
                    },
                )
            }
            Self::InvalidCredential { key_preview } => {
                error!(api_key.preview = %key_preview, "Configured API key was rejected upstream");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorDetails {
                        error_type: "INVALID_API_KEY".to_string(),
                        message: "A configured API key was rejected by the upstream service"
                            .to_string(),
                        details: Some(key_preview.clone()),
                    },
                )
            }
            Self::InsufficientPermission { key_preview } => {
                error!(api_key.preview = %key_preview, "Configured API key lacks lookup permission");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorDetails {
                        error_type: "INSUFFICIENT_PERMISSION".to_string(),
                        message: "A configured API key lacks permission for blacklist lookups"
                            .to_string(),
                        details: Some(key_preview.clone()),
                    },
                )
            }
            Self::AllEndpointsFailed => (
                StatusCode::BAD_GATEWAY,
                ErrorDetails {
                    error_type: "ALL_ENDPOINTS_FAILED".to_string(),
                    message: "Every upstream endpoint variant failed".to_string(),
                    details: None,
                },
            ),

            // --- upstream transport ---
            Self::Upstream(e) => {
                error!("Upstream reqwest error: {}", e);
                let (status_code, message) = if e.is_timeout() {
                    (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out")
                } else if e.is_connect() {
                    (StatusCode::BAD_GATEWAY, "Failed to connect to upstream service")
                } else if e.is_body() || e.is_decode() {
                    (
                        StatusCode::BAD_GATEWAY,
                        "Error processing response body from upstream service",
                    )
                } else {
                    (StatusCode::BAD_GATEWAY, "Error communicating with upstream service")
                };
                (
                    status_code,
                    ErrorDetails {
                        error_type: "UPSTREAM_ERROR".to_string(),
                        message: message.to_string(),
                        details: Some(e.to_string()),
                    },
                )
            }
            Self::ResponseBody(msg) => {
                error!("Response body processing error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorDetails {
                        error_type: "RESPONSE_PROCESSING_ERROR".to_string(),
                        message: "Failed to process response from upstream service".to_string(),
                        details: Some(msg.clone()),
                    },
                )
            }

            // --- internal ---
            Self::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_ERROR".to_string(),
                        message: "Internal server configuration error".to_string(),
                        details: None,
                    },
                )
            }
            Self::Io(e) => {
                error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "IO_ERROR".to_string(),
                        message: "Internal server error during IO operation".to_string(),
                        details: None,
                    },
                )
            }
            Self::YamlParsing(e) => {
                error!("YAML parsing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "CONFIG_PARSE_ERROR".to_string(),
                        message: "Failed to parse configuration file".to_string(),
                        details: None,
                    },
                )
            }
            Self::HttpClientBuild(e) => {
                error!("HTTP client build error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "HTTP_CLIENT_BUILD_ERROR".to_string(),
                        message: "Internal server error building HTTP client".to_string(),
                        details: None,
                    },
                )
            }

            // --- client ---
            Self::RequestBody(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetails {
                    error_type: "REQUEST_BODY_ERROR".to_string(),
                    message: "Failed to process request body".to_string(),
                    details: Some(msg.clone()),
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_details) = self.to_status_and_details();
        let body = Json(ErrorResponse {
            error: error_details,
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::io;

    async fn check_response(
        error: AppError,
        expected_status: StatusCode,
        expected_type: &str,
        expected_message_substring: &str,
        expect_details: bool,
    ) {
        let response = error.into_response();
        assert_eq!(response.status(), expected_status, "Status code mismatch");

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let body_json: Value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            panic!(
                "Response body is not valid JSON: {}. Body: {}",
                e,
                String::from_utf8_lossy(&bytes)
            )
        });

        let error_obj = &body_json["error"];
        assert!(!error_obj.is_null(), "JSON 'error' field is missing");
        assert_eq!(error_obj["type"].as_str(), Some(expected_type), "Error type mismatch");

        let error_msg = error_obj["message"]
            .as_str()
            .expect("JSON 'error.message' field is not a string or missing");
        assert!(
            error_msg.contains(expected_message_substring),
            "Expected message '{error_msg}' to contain '{expected_message_substring}'"
        );

        if expect_details {
            assert!(error_obj["details"].is_string(), "Expected 'error.details' string");
        } else {
            assert!(error_obj["details"].is_null(), "Expected no 'error.details'");
        }
    }

    #[tokio::test]
    async fn test_into_response_all_exhausted() {
        check_response(
            AppError::AllCredentialsExhausted,
            StatusCode::SERVICE_UNAVAILABLE,
            "ALL_KEYS_EXHAUSTED",
            "rate limited",
            false,
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_rate_limited_carries_preview_only() {
        let response = AppError::RateLimited {
            key_preview: "abcdefgh...".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("abcdefgh..."));
        assert!(body.contains("RATE_LIMITED"));
    }

    #[tokio::test]
    async fn test_into_response_invalid_credential() {
        check_response(
            AppError::InvalidCredential {
                key_preview: "12345678...".to_string(),
            },
            StatusCode::BAD_GATEWAY,
            "INVALID_API_KEY",
            "rejected",
            true,
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_no_credentials() {
        check_response(
            AppError::NoCredentialsConfigured,
            StatusCode::INTERNAL_SERVER_ERROR,
            "NO_CREDENTIALS",
            "No MXToolbox API keys configured",
            false,
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_all_endpoints_failed() {
        check_response(
            AppError::AllEndpointsFailed,
            StatusCode::BAD_GATEWAY,
            "ALL_ENDPOINTS_FAILED",
            "endpoint",
            false,
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_config() {
        check_response(
            AppError::Config("Test config issue".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_ERROR",
            "Internal server configuration error",
            false,
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        check_response(
            AppError::Io(io_error),
            StatusCode::INTERNAL_SERVER_ERROR,
            "IO_ERROR",
            "Internal server error during IO operation",
            false,
        )
        .await;
    }

    #[tokio::test]
    async fn test_into_response_request_body_error() {
        check_response(
            AppError::RequestBody("Invalid IP list provided".to_string()),
            StatusCode::BAD_REQUEST,
            "REQUEST_BODY_ERROR",
            "Failed to process request body",
            true,
        )
        .await;
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::AllCredentialsExhausted.is_transient());
        assert!(AppError::AllEndpointsFailed.is_transient());
        assert!(!AppError::NoCredentialsConfigured.is_transient());
        assert!(!AppError::InvalidCredential {
            key_preview: "x".to_string()
        }
        .is_transient());
    }
}
