//! Service error types with HTTP status code mapping.
//!
//! [`ServiceError`] is the error type of every handler and of the chaos
//! middleware. Each variant maps to a status code and a structured JSON
//! error response. Infrastructure failures are logged with their full
//! cause here and reach the caller only as a generic message.

use axum::extract::rejection::PathRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1003,
///     "message": "title and content should not be empty"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Handler and middleware errors.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                   |
/// |-----------|-----------------|-------------------------------|
/// | 1000–1999 | Client input    | 400 Bad Request / 409 Conflict |
/// | 2000–2999 | Fault injection | 400 Bad Request               |
/// | 3000–3999 | Infrastructure  | 500 / 503                     |
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request body was empty.
    #[error("Empty request body")]
    EmptyBody,

    /// The request body was not the expected JSON object.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// A required field was absent or blank.
    #[error("{0}")]
    MissingRequiredField(&'static str),

    /// A field exceeds the width of its column.
    #[error("{0} must be at most 256 characters")]
    FieldTooLong(&'static str),

    /// A path parameter could not be parsed.
    #[error("Invalid path parameter: {0}")]
    InvalidPathParam(String),

    /// The `posts` table is not in the state the operation needs.
    #[error("{0}")]
    SchemaConflict(#[source] StoreError),

    /// The request was rejected on purpose by fault injection.
    #[error("Chaos got your request")]
    ChaosInjected,

    /// No database connection could be obtained.
    #[error("Error while connecting to the database")]
    ConnectionUnavailable(#[source] StoreError),

    /// The database failed to run the statement.
    #[error("Error while executing the data operation")]
    DataOperationFailed(#[source] StoreError),
}

impl ServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::EmptyBody => 1001,
            Self::MalformedBody(_) => 1002,
            Self::MissingRequiredField(_) => 1003,
            Self::SchemaConflict(_) => 1004,
            Self::FieldTooLong(_) => 1005,
            Self::InvalidPathParam(_) => 1006,
            Self::ChaosInjected => 2001,
            Self::DataOperationFailed(_) => 3001,
            Self::ConnectionUnavailable(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyBody
            | Self::MalformedBody(_)
            | Self::MissingRequiredField(_)
            | Self::FieldTooLong(_)
            | Self::InvalidPathParam(_)
            | Self::ChaosInjected => StatusCode::BAD_REQUEST,
            Self::SchemaConflict(_) => StatusCode::CONFLICT,
            Self::DataOperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConnectionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidPathParam(rejection.body_text())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TableExists | StoreError::TableMissing => Self::SchemaConflict(err),
            e if e.is_connection_failure() => Self::ConnectionUnavailable(e),
            e => Self::DataOperationFailed(e),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            let cause = std::error::Error::source(&self)
                .map(ToString::to_string)
                .unwrap_or_default();
            tracing::error!(
                code = self.error_code(),
                status = status.as_u16(),
                cause = %cause,
                "{self}"
            );
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
