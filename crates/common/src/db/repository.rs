//! Repository pattern for database operations
//!
//! Implements the workflow store traits over Postgres. Plain reads go to the
//! replica when one is configured; everything that writes or locks uses the
//! primary.

use crate::db::models::*;
use crate::db::DbPool;
use crate::directory::ActorDirectory;
use crate::errors::{AppError, Result};
use crate::workflow::{
    CycleLedger, DocumentRepository, NewCycleRecord, NewDocument, UnitOfWork, WorkflowStore,
};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, Statement,
    TransactionTrait,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    async fn find_document(&self, conn: &impl ConnectionTrait, id: Uuid) -> Result<Document> {
        DocumentEntity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }
}

// ========================================================================
// Document Operations
// ========================================================================

#[async_trait]
impl DocumentRepository for Repository {
    async fn create(&self, new: NewDocument) -> Result<Document> {
        new.validate()?;
        let doc = new.into_document();

        let document = DocumentActiveModel {
            id: Set(doc.id),
            kind: Set(doc.kind),
            owner_id: Set(doc.owner_id),
            reviewer_id: Set(doc.reviewer_id),
            topic: Set(doc.topic),
            note: Set(doc.note),
            file_key: Set(doc.file_key),
            status: Set(doc.status),
            created_at: Set(doc.created_at),
            updated_at: Set(doc.updated_at),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Document> {
        self.find_document(self.read_conn(), id).await
    }

    async fn set_status(&self, id: Uuid, status: DocumentStatus) -> Result<Document> {
        let mut document: DocumentActiveModel =
            self.find_document(self.write_conn(), id).await?.into();

        document.status = Set(status);
        document.updated_at = Set(chrono::Utc::now().into());

        document.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn set_reviewer(&self, id: Uuid, reviewer_id: Uuid) -> Result<Document> {
        let mut document: DocumentActiveModel =
            self.find_document(self.write_conn(), id).await?.into();

        document.reviewer_id = Set(Some(reviewer_id));
        document.updated_at = Set(chrono::Utc::now().into());

        document.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::OwnerId.eq(owner_id))
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_by_reviewer(&self, reviewer_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::ReviewerId.eq(reviewer_id))
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

// ========================================================================
// Cycle Ledger Operations
// ========================================================================

#[async_trait]
impl CycleLedger for Repository {
    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<CycleRecord>> {
        CycleRecordEntity::find()
            .filter(CycleRecordColumn::DocumentId.eq(document_id))
            .order_by_desc(CycleRecordColumn::CycleNumber)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn get_cycle(&self, id: Uuid) -> Result<CycleRecord> {
        CycleRecordEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .ok_or_else(|| AppError::CycleNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl WorkflowStore for Repository {
    /// `SELECT … FOR UPDATE` on the document row inside a fresh transaction
    async fn lock_document(&self, id: Uuid) -> Result<Box<dyn UnitOfWork>> {
        let txn = self.write_conn().begin().await?;

        let document = DocumentEntity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?;

        match document {
            Some(document) => {
                debug!(document_id = %id, "Document row locked");
                Ok(Box::new(PgUnitOfWork { txn, document }))
            }
            None => {
                txn.rollback().await?;
                Err(AppError::DocumentNotFound { id: id.to_string() })
            }
        }
    }
}

// ========================================================================
// Actor Directory
// ========================================================================

#[async_trait]
impl ActorDirectory for Repository {
    async fn resolve(&self, id: Uuid) -> Result<Option<Actor>> {
        ActorEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn resolve_many(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Actor>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let actors = ActorEntity::find()
            .filter(ActorColumn::Id.is_in(ids.iter().copied()))
            .all(self.read_conn())
            .await?;

        Ok(actors.into_iter().map(|a| (a.id, a)).collect())
    }
}

/// Transaction holding the document row lock
struct PgUnitOfWork {
    txn: DatabaseTransaction,
    document: Document,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn document(&self) -> &Document {
        &self.document
    }

    async fn next_cycle_number(&mut self) -> Result<i32> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT COALESCE(MAX(cycle_number), 0) + 1 FROM cycle_records WHERE document_id = $1",
            [self.document.id.into()],
        );

        let row = self
            .txn
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "cycle number query returned no row".to_string(),
            })?;

        row.try_get_by_index::<i32>(0).map_err(Into::into)
    }

    async fn append_cycle(&mut self, record: NewCycleRecord) -> Result<CycleRecord> {
        let (document_id, cycle_number) = (record.document_id, record.cycle_number);
        let row = record.into_record();

        let cycle = CycleRecordActiveModel {
            id: Set(row.id),
            document_id: Set(row.document_id),
            actor_id: Set(row.actor_id),
            actor_role: Set(row.actor_role),
            cycle_number: Set(row.cycle_number),
            file_key: Set(row.file_key),
            file_size: Set(row.file_size),
            file_sha256: Set(row.file_sha256),
            note: Set(row.note),
            created_at: Set(row.created_at),
        };

        cycle
            .insert(&self.txn)
            .await
            .map_err(|e| ledger_error(e, document_id, cycle_number))
    }

    async fn set_status(&mut self, status: DocumentStatus) -> Result<Document> {
        let mut document: DocumentActiveModel = self.document.clone().into();
        document.status = Set(status);
        document.updated_at = Set(chrono::Utc::now().into());

        let updated = document.update(&self.txn).await?;
        self.document = updated.clone();
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().await.map_err(Into::into)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback().await.map_err(Into::into)
    }
}

/// A unique violation on `(document_id, cycle_number)` means the row lock
/// was bypassed; everything else is an ordinary database error.
fn ledger_error(err: DbErr, document_id: Uuid, cycle_number: i32) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            crate::workflow::duplicate_cycle(document_id, cycle_number)
        }
        _ => AppError::Database(err),
    }
}
