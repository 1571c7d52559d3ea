//! Error types for ThesisTrack services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,
    PayloadTooLarge,

    // Authorization errors (3xxx)
    Unauthorized,

    // Resource errors (4xxx)
    DocumentNotFound,
    CycleNotFound,
    BlobNotFound,

    // Workflow errors (5xxx)
    InvalidTransition,
    ConstraintViolation,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // Storage errors (8xxx)
    StorageFailure,

    // Internal errors (9xxx)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            // Authz (3xxx)
            ErrorCode::Unauthorized => 3001,

            // Resources (4xxx)
            ErrorCode::DocumentNotFound => 4002,
            ErrorCode::CycleNotFound => 4003,
            ErrorCode::BlobNotFound => 4004,

            // Workflow (5xxx)
            ErrorCode::InvalidTransition => 5001,
            ErrorCode::ConstraintViolation => 5002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // Storage (8xxx)
            ErrorCode::StorageFailure => 8001,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The acting user is not the document's registered student or reviewer
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // Resource errors
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Cycle record not found: {id}")]
    CycleNotFound { id: String },

    #[error("Blob not found: {key}")]
    BlobNotFound { key: String },

    // Workflow errors
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Cycle-number uniqueness was violated. Indicates a serialization bug.
    #[error("Constraint violated: {message}")]
    Constraint { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Storage errors
    #[error("Storage failure: {message}")]
    StorageFailure { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::CycleNotFound { .. } => ErrorCode::CycleNotFound,
            AppError::BlobNotFound { .. } => ErrorCode::BlobNotFound,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::Constraint { .. } => ErrorCode::ConstraintViolation,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::StorageFailure { .. } => ErrorCode::StorageFailure,
            AppError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            AppError::Unauthorized { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::DocumentNotFound { .. }
            | AppError::CycleNotFound { .. }
            | AppError::BlobNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Constraint { .. }
            | AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::StorageFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Shorthand for a validation failure on a named field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            AppError::MissingField { field } => Some(field.clone()),
            _ => None,
        };

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
                request_id: None, // Filled in by the request-id layer header
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageFailure {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseConnection {
            message: format!("Migration failed: {}", err),
        }
    }
}
