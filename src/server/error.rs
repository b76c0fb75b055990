//! Error plumbing for route handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Extension trait for logging an error and turning it into a JSON reply.
pub trait LogErr<T> {
    /// Log with context and answer 500 with `message`.
    fn log_500(self, context: &str, message: &str) -> Result<T, ApiError>;

    /// Log with context and answer `status` with `message`.
    fn log_status(self, context: &str, status: StatusCode, message: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str, message: &str) -> Result<T, ApiError> {
        self.log_status(context, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn log_status(self, context: &str, status: StatusCode, message: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            log::error!("{}: {}", context, e);
            ApiError::new(status, message)
        })
    }
}

/// `{ "error": ... }` reply with a status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
