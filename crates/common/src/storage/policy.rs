//! Upload acceptance rules

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Longest stem kept from a client file name; the key adds about 72 bytes
/// and the final path segment must stay under 255.
const MAX_STEM_BYTES: usize = 100;
const MAX_EXT_BYTES: usize = 16;

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid file name pattern"))
}

/// Reduce a client-supplied file name to its last path component and the
/// characters `[A-Za-z0-9._-]`. Leading dots are dropped so the result can
/// never be `..` or a hidden file. Long stems are cut to 100 bytes with the
/// extension kept.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = unsafe_chars().replace_all(base, "_");
    let trimmed = cleaned.trim_start_matches('.');

    if trimmed.is_empty() {
        return "upload".to_string();
    }

    // Only ASCII survives the pattern above, so byte offsets are char boundaries
    let (stem, ext) = match trimmed.rfind('.') {
        Some(dot) if trimmed.len() - dot <= MAX_EXT_BYTES => trimmed.split_at(dot),
        _ => (trimmed, ""),
    };
    if stem.len() <= MAX_STEM_BYTES {
        trimmed.to_string()
    } else {
        format!("{}{}", &stem[..MAX_STEM_BYTES], ext)
    }
}

/// Size and type limits applied to every upload before anything is written
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub min_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 15 << 20,
            min_bytes: 1,
        }
    }
}

impl From<&StorageConfig> for UploadPolicy {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_bytes: config.max_file_size_bytes,
            min_bytes: config.min_file_size_bytes.max(1),
        }
    }
}

impl UploadPolicy {
    /// Accept only PDFs: `.pdf` extension and `%PDF-` content header
    pub fn check(&self, file_name: &str, data: &[u8]) -> Result<()> {
        if file_name.trim().is_empty() {
            return Err(AppError::MissingField {
                field: "file".to_string(),
            });
        }

        if data.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge {
                size: data.len(),
                limit: self.max_bytes,
            });
        }

        if data.len() < self.min_bytes {
            return Err(AppError::invalid_field(
                "file",
                format!("file is smaller than {} bytes", self.min_bytes),
            ));
        }

        let is_pdf_name = file_name.to_ascii_lowercase().ends_with(".pdf");
        if !is_pdf_name {
            return Err(AppError::InvalidFormat {
                message: "file extension must be .pdf".to_string(),
            });
        }

        if !data.starts_with(PDF_MAGIC) {
            return Err(AppError::InvalidFormat {
                message: "only PDF files are accepted".to_string(),
            });
        }

        Ok(())
    }
}
