//! Multipart upload forms

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use thesistrack_common::errors::{AppError, Result};
use uuid::Uuid;

/// The single file part of an upload form
pub struct FilePart {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Text fields plus the `file` part of a multipart body
#[derive(Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<FilePart>,
}

impl UploadForm {
    /// Drain the multipart stream. Only the first `file` part is kept.
    pub async fn read(mut multipart: Multipart, body_limit: usize) -> Result<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, body_limit))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "file" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, body_limit))?;
                if form.file.is_none() {
                    form.file = Some(FilePart {
                        file_name,
                        data: data.to_vec(),
                    });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, body_limit))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Trimmed text value; blank counts as absent
    pub fn optional(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required(&self, name: &str) -> Result<String> {
        self.optional(name).ok_or_else(|| AppError::MissingField {
            field: name.to_string(),
        })
    }

    pub fn uuid(&self, name: &str) -> Result<Uuid> {
        parse_uuid(name, &self.required(name)?)
    }

    pub fn optional_uuid(&self, name: &str) -> Result<Option<Uuid>> {
        self.optional(name)
            .map(|raw| parse_uuid(name, &raw))
            .transpose()
    }

    pub fn take_file(&mut self) -> Result<FilePart> {
        self.file.take().ok_or_else(|| AppError::MissingField {
            field: "file".to_string(),
        })
    }
}

fn parse_uuid(name: &str, raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|_| AppError::invalid_field(name, format!("'{}' is not a valid UUID", raw)))
}

fn multipart_error(err: MultipartError, body_limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            size: body_limit.saturating_add(1),
            limit: body_limit,
        }
    } else {
        AppError::InvalidFormat {
            message: err.body_text(),
        }
    }
}
