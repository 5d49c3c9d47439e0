//! API error types and response handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to an HTTP status code and produces a consistent JSON
/// error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 403 Forbidden - the operation is understood but refused.
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 429 Too Many Requests - the caller is firing faster than allowed.
    TooManyRequests {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "not_present",
    "message": "No tracked device is present"
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "not_present")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "No tracked device is present")]
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::Forbidden {
                error_code,
                message,
            } => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    error: error_code,
                    message,
                },
            ),
            Self::TooManyRequests {
                error_code,
                message,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse {
                    error: error_code,
                    message,
                },
            ),
        };
        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden { message, .. } => write!(f, "Forbidden: {message}"),
            Self::TooManyRequests { message, .. } => {
                write!(f, "Too Many Requests: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}
