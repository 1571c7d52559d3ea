//! Blob storage for uploaded files
//!
//! Provides:
//! - The `BlobStore` contract consumed by the workflow coordinator
//! - A local-filesystem store and an in-memory store
//! - Upload policy checks (PDF only, size bounds, safe file names)
//! - Key naming per document kind and actor role

mod local;
mod memory;
mod policy;

pub use local::LocalBlobStore;
pub use memory::InMemoryBlobStore;
pub use policy::{sanitize_file_name, UploadPolicy};

use crate::db::models::{ActorRole, DocumentKind};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Result of a successful blob write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBlob {
    pub key: String,
    pub size: i64,
    pub sha256: String,
}

impl StoredBlob {
    pub fn describe(key: String, data: &[u8]) -> Self {
        Self {
            key,
            size: data.len() as i64,
            sha256: hex::encode(Sha256::digest(data)),
        }
    }
}

/// Trait for blob persistence.
///
/// Writes are durable when `put` returns. There is no atomicity with the
/// relational store; callers compensate with `delete`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under a key derived from `suggested_key`
    async fn put(&self, suggested_key: &str, data: &[u8]) -> Result<StoredBlob>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Backend name for logs and readiness output
    fn backend(&self) -> &'static str;
}

/// Who uploaded a blob, which decides its directory and file-name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSlot {
    /// The student's initial upload that creates the document
    Primary,
    /// A cycle record upload
    Cycle(ActorRole),
}

impl UploadSlot {
    fn dir(&self) -> &'static str {
        match self {
            UploadSlot::Primary => "primary",
            UploadSlot::Cycle(ActorRole::Reviewer) => "review",
            UploadSlot::Cycle(ActorRole::Submitter) => "revision",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            UploadSlot::Primary => "",
            UploadSlot::Cycle(ActorRole::Reviewer) => "REVIEW_",
            UploadSlot::Cycle(ActorRole::Submitter) => "REVISION_",
        }
    }
}

fn kind_prefix(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::ConceptProposal => "CONCEPT",
        DocumentKind::ResearchProposal => "PROPOSAL",
        DocumentKind::InterimReportA => "REPORT_A",
        DocumentKind::InterimReportB => "REPORT_B",
    }
}

/// Build the key an upload is filed under:
/// `{kind}/{slot}/{PREFIX}_{actor}_{yyyymmddHHMMSS}_{8 hex}_{safe name}`.
///
/// The random segment keeps two uploads from the same actor within one second
/// from colliding.
pub fn blob_key(kind: DocumentKind, slot: UploadSlot, actor_id: Uuid, file_name: &str) -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}/{}{}_{}_{}_{}_{}",
        kind.as_str(),
        slot.dir(),
        slot.prefix(),
        kind_prefix(kind),
        actor_id.simple(),
        Utc::now().format("%Y%m%d%H%M%S"),
        &unique[..8],
        sanitize_file_name(file_name),
    )
}
