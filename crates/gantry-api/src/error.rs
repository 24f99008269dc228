//! API error types and HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use gantry_core::Error as CoreError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ApiErrorBody {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients).
    pub message: String,
}

/// HTTP API error with stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Returns an error response for missing resources.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Returns an error response for an unparseable run reference.
    pub fn malformed_run_reference(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MALFORMED_RUN_REFERENCE", message)
    }

    /// Returns an error response for a target whose lock stayed busy.
    ///
    /// Deliberately not-found-class: the caller cannot distinguish a
    /// contended target from an absent artifact and is expected to retry.
    pub fn target_busy(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "TARGET_BUSY", message)
    }

    /// Returns an error response for upstream API failures.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
    }

    /// Returns an error response for archives rejected by the containment
    /// check.
    pub fn unsafe_archive(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "UNSAFE_ARCHIVE", message)
    }

    /// Returns an internal error response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Returns the human-readable error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = self.code, message = %self.message, "Request rejected");
        }
        (
            self.status,
            Json(ApiErrorBody {
                code: self.code.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::NotFound { message } => Self::not_found(message),
            CoreError::MalformedRunReference { reference } => Self::malformed_run_reference(
                format!("run reference {reference:?} is neither 'latest' nor a run id"),
            ),
            CoreError::GateTimeout { target, waited } => Self::target_busy(format!(
                "target '{target}' is busy: no lock acquired within {waited:?}"
            )),
            CoreError::Upstream { message, .. } => Self::upstream(message),
            CoreError::SecurityViolation { entry } => Self::unsafe_archive(format!(
                "archive entry {entry:?} escapes the extraction directory"
            )),
            CoreError::Internal { message, .. } => Self::internal(message),
        }
    }
}
