//! Error types for the reconciliation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field-level validation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Main error type for the reconciliation server
#[derive(Debug, Error)]
pub enum Error {
    // Agent errors (2000-2999)
    #[error("Agent not found: {0}")]
    AgentNotFound(i64),

    #[error("Remote development is not enabled for agent {0}")]
    AgentNotEnabled(i64),

    // Workspace errors (3000-3999)
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(i64),

    // Validation errors (4000-4999)
    #[error("Validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    // Authorization errors (5000-5999)
    #[error("Remote development feature is not licensed")]
    Unlicensed,

    // Devfile errors (6000-6999)
    #[error("Devfile processing failed: {0}")]
    DevfileProcessing(String),

    // Infrastructure errors (7000-7999)
    #[error("Database error: {0}")]
    DatabaseError(String),

    // General errors (1000-1999)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Shorthand for a single-field validation error
    pub fn validation(field: &str, message: &str) -> Self {
        Error::Validation(vec![FieldError::new(field, message)])
    }

    /// Get the error code
    pub fn code(&self) -> u32 {
        match self {
            // Agent errors (2000-2999)
            Error::AgentNotFound(_) => 2001,
            Error::AgentNotEnabled(_) => 2002,

            // Workspace errors (3000-3999)
            Error::WorkspaceNotFound(_) => 3001,

            // Validation errors (4000-4999)
            Error::Validation(_) => 4001,

            // Authorization errors (5000-5999)
            Error::Unlicensed => 5001,

            // Devfile errors (6000-6999)
            Error::DevfileProcessing(_) => 6001,

            // Infrastructure errors (7000-7999)
            Error::DatabaseError(_) => 7001,

            // General errors (1000-1999)
            Error::InvalidRequest(_) => 1001,
            Error::Internal(_) => 1002,
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::AgentNotFound(_) | Error::WorkspaceNotFound(_) => StatusCode::NOT_FOUND,

            Error::Validation(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            Error::Unlicensed | Error::AgentNotEnabled(_) => StatusCode::FORBIDDEN,

            Error::DevfileProcessing(_) | Error::DatabaseError(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Error::Validation(fields) => Some(fields.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

// Implement From for common error types
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}
