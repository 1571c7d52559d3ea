//! API handlers module

pub mod cycles;
pub mod documents;
mod form;
pub mod health;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use thesistrack_common::errors::AppError;
use validator::ValidationErrors;

/// Convert validator output into the first failing field
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|f| f.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

/// PDF download named after the last segment of the blob key
pub(crate) fn attachment(key: &str, data: Vec<u8>) -> Response {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        data,
    )
        .into_response()
}
