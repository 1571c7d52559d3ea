//! Storage abstraction for the review workflow.
//!
//! `DocumentRepository` and `CycleLedger` cover plain reads and
//! non-transactional writes. Anything that must happen under the document
//! row lock (cycle numbering, ledger appends, the status flip) goes through a
//! [`UnitOfWork`] obtained from [`WorkflowStore::lock_document`].

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::models::{ActorRole, CycleRecord, Document, DocumentKind, DocumentStatus};
use crate::errors::{AppError, Result};

/// Fields for a freshly uploaded document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: Uuid,
    pub kind: DocumentKind,
    pub topic: String,
    pub note: Option<String>,
    pub reviewer_id: Option<Uuid>,
    pub file_key: String,
}

impl NewDocument {
    /// Owner, topic, and primary file are required
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.is_nil() {
            return Err(AppError::MissingField {
                field: "owner_id".to_string(),
            });
        }
        if self.topic.trim().is_empty() {
            return Err(AppError::MissingField {
                field: "topic".to_string(),
            });
        }
        if self.file_key.trim().is_empty() {
            return Err(AppError::MissingField {
                field: "file".to_string(),
            });
        }
        Ok(())
    }

    /// Materialize the row as it is first stored: status pending, both
    /// timestamps set to now.
    pub fn into_document(self) -> Document {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            kind: self.kind,
            owner_id: self.owner_id,
            reviewer_id: self.reviewer_id,
            topic: self.topic.trim().to_string(),
            note: self.note,
            file_key: self.file_key,
            status: DocumentStatus::Pending,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }
}

/// Fields for a ledger append
#[derive(Debug, Clone)]
pub struct NewCycleRecord {
    pub document_id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: ActorRole,
    pub cycle_number: i32,
    pub file_key: String,
    pub file_size: i64,
    pub file_sha256: String,
    pub note: Option<String>,
}

impl NewCycleRecord {
    pub fn into_record(self) -> CycleRecord {
        CycleRecord {
            id: Uuid::new_v4(),
            document_id: self.document_id,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            cycle_number: self.cycle_number,
            file_key: self.file_key,
            file_size: self.file_size,
            file_sha256: self.file_sha256,
            note: self.note,
            created_at: Utc::now().into(),
        }
    }
}

/// CRUD and status mutation for documents
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert with status pending. Fails with a validation error when a
    /// required field is empty.
    async fn create(&self, new: NewDocument) -> Result<Document>;

    async fn get_by_id(&self, id: Uuid) -> Result<Document>;

    /// Unconditional write; callers validate the transition first.
    async fn set_status(&self, id: Uuid, status: DocumentStatus) -> Result<Document>;

    /// Assign or reassign the reviewer (overwrites any existing assignment)
    async fn set_reviewer(&self, id: Uuid, reviewer_id: Uuid) -> Result<Document>;

    /// Newest first
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>>;

    /// Newest first
    async fn list_by_reviewer(&self, reviewer_id: Uuid) -> Result<Vec<Document>>;
}

/// Read side of the append-only exchange history
#[async_trait]
pub trait CycleLedger: Send + Sync {
    /// All records of a document, most recent cycle first
    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<CycleRecord>>;

    async fn get_cycle(&self, id: Uuid) -> Result<CycleRecord>;
}

/// Work performed while holding the exclusive lock on one document row.
///
/// Dropping a unit of work without committing discards all staged writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// The locked document as of lock acquisition, updated by `set_status`
    fn document(&self) -> &Document;

    /// `max(cycle_number) + 1` over the document's records, or 1
    async fn next_cycle_number(&mut self) -> Result<i32>;

    /// Insert a record; a duplicate `(document_id, cycle_number)` is a
    /// constraint error.
    async fn append_cycle(&mut self, record: NewCycleRecord) -> Result<CycleRecord>;

    async fn set_status(&mut self, status: DocumentStatus) -> Result<Document>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Everything the coordinator needs from persistence
#[async_trait]
pub trait WorkflowStore: DocumentRepository + CycleLedger {
    /// Load a document under an exclusive lock held until the returned unit
    /// of work is committed, rolled back, or dropped. Concurrent callers for
    /// the same id wait; different ids proceed independently.
    async fn lock_document(&self, id: Uuid) -> Result<Box<dyn UnitOfWork>>;
}

pub(crate) fn document_not_found(id: Uuid) -> AppError {
    AppError::DocumentNotFound { id: id.to_string() }
}

pub(crate) fn duplicate_cycle(document_id: Uuid, cycle_number: i32) -> AppError {
    AppError::Constraint {
        message: format!(
            "cycle {} already recorded for document {}",
            cycle_number, document_id
        ),
    }
}
