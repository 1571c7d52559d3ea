//! In-memory implementation of the workflow store.
//!
//! Mirrors the Postgres semantics closely enough to exercise the
//! coordinator: a per-document async mutex stands in for the row lock, and
//! writes made through a unit of work stay staged until commit. All state is
//! lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::store::{
    document_not_found, duplicate_cycle, CycleLedger, DocumentRepository, NewCycleRecord,
    NewDocument, UnitOfWork, WorkflowStore,
};
use crate::db::models::{CycleRecord, Document, DocumentStatus};
use crate::errors::{AppError, Result};

#[derive(Default)]
struct Inner {
    documents: RwLock<HashMap<Uuid, Document>>,
    cycles: RwLock<Vec<CycleRecord>>,
    row_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Inner {
    async fn row_lock(&self, id: Uuid) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.row_locks.lock().await;
        if !self.documents.read().await.contains_key(&id) {
            return Err(document_not_found(id));
        }
        Ok(locks.entry(id).or_default().clone())
    }

    /// Drop the lock entry once no unit of work holds or waits on it
    async fn release_row_lock(&self, id: Uuid, guard: OwnedMutexGuard<()>) {
        let mut locks = self.row_locks.lock().await;
        drop(guard);
        // One reference in the map; any other belongs to a waiter
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    async fn row_lock_count(&self) -> usize {
        self.row_locks.lock().await.len()
    }
}

/// Workflow store backed by process memory
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cycle records across all documents
    pub async fn cycle_count(&self) -> usize {
        self.inner.cycles.read().await.len()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn create(&self, new: NewDocument) -> Result<Document> {
        new.validate()?;
        let document = new.into_document();
        self.inner
            .documents
            .write()
            .await
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Document> {
        self.inner
            .documents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| document_not_found(id))
    }

    async fn set_status(&self, id: Uuid, status: DocumentStatus) -> Result<Document> {
        let mut documents = self.inner.documents.write().await;
        let document = documents.get_mut(&id).ok_or_else(|| document_not_found(id))?;
        document.status = status;
        document.updated_at = Utc::now().into();
        Ok(document.clone())
    }

    async fn set_reviewer(&self, id: Uuid, reviewer_id: Uuid) -> Result<Document> {
        let mut documents = self.inner.documents.write().await;
        let document = documents.get_mut(&id).ok_or_else(|| document_not_found(id))?;
        document.reviewer_id = Some(reviewer_id);
        document.updated_at = Utc::now().into();
        Ok(document.clone())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        let documents = self.inner.documents.read().await;
        let mut owned: Vec<Document> = documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_by_reviewer(&self, reviewer_id: Uuid) -> Result<Vec<Document>> {
        let documents = self.inner.documents.read().await;
        let mut assigned: Vec<Document> = documents
            .values()
            .filter(|d| d.reviewer_id == Some(reviewer_id))
            .cloned()
            .collect();
        assigned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assigned)
    }
}

#[async_trait]
impl CycleLedger for InMemoryStore {
    async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<CycleRecord>> {
        let cycles = self.inner.cycles.read().await;
        let mut records: Vec<CycleRecord> = cycles
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.cycle_number
                .cmp(&a.cycle_number)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(records)
    }

    async fn get_cycle(&self, id: Uuid) -> Result<CycleRecord> {
        self.inner
            .cycles
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| AppError::CycleNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn lock_document(&self, id: Uuid) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.inner.row_lock(id).await?.lock_owned().await;

        // Read only after the lock is held so we see the last committed state
        let document = match self.get_by_id(id).await {
            Ok(document) => document,
            Err(e) => {
                self.inner.release_row_lock(id, guard).await;
                return Err(e);
            }
        };

        Ok(Box::new(MemoryUnitOfWork {
            inner: self.inner.clone(),
            guard,
            document,
            status_dirty: false,
            staged: Vec::new(),
        }))
    }
}

struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    guard: OwnedMutexGuard<()>,
    document: Document,
    status_dirty: bool,
    staged: Vec<CycleRecord>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn document(&self) -> &Document {
        &self.document
    }

    async fn next_cycle_number(&mut self) -> Result<i32> {
        let cycles = self.inner.cycles.read().await;
        let max = cycles
            .iter()
            .chain(self.staged.iter())
            .filter(|c| c.document_id == self.document.id)
            .map(|c| c.cycle_number)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn append_cycle(&mut self, record: NewCycleRecord) -> Result<CycleRecord> {
        let cycles = self.inner.cycles.read().await;
        let taken = cycles
            .iter()
            .chain(self.staged.iter())
            .any(|c| c.document_id == record.document_id && c.cycle_number == record.cycle_number);
        drop(cycles);

        if taken {
            return Err(duplicate_cycle(record.document_id, record.cycle_number));
        }

        let stored = record.into_record();
        self.staged.push(stored.clone());
        Ok(stored)
    }

    async fn set_status(&mut self, status: DocumentStatus) -> Result<Document> {
        self.document.status = status;
        self.document.updated_at = Utc::now().into();
        self.status_dirty = true;
        Ok(self.document.clone())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let id = this.document.id;
        if this.status_dirty {
            // Only the columns this unit of work owns; a reviewer assigned
            // meanwhile must survive
            let mut documents = this.inner.documents.write().await;
            if let Some(current) = documents.get_mut(&id) {
                current.status = this.document.status;
                current.updated_at = this.document.updated_at;
            }
        }
        if !this.staged.is_empty() {
            this.inner.cycles.write().await.extend(this.staged);
        }
        this.inner.release_row_lock(id, this.guard).await;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.inner
            .release_row_lock(this.document.id, this.guard)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ActorRole, DocumentKind};

    async fn seeded() -> (InMemoryStore, Document) {
        let store = InMemoryStore::new();
        let doc = store
            .create(NewDocument {
                owner_id: Uuid::new_v4(),
                kind: DocumentKind::ResearchProposal,
                topic: "Soil moisture sensing".to_string(),
                note: None,
                reviewer_id: Some(Uuid::new_v4()),
                file_key: "research_proposal/primary/x.pdf".to_string(),
            })
            .await
            .unwrap();
        (store, doc)
    }

    fn record(doc: &Document, cycle_number: i32) -> NewCycleRecord {
        NewCycleRecord {
            document_id: doc.id,
            actor_id: doc.owner_id,
            actor_role: ActorRole::Submitter,
            cycle_number,
            file_key: format!("k{}", cycle_number),
            file_size: 10,
            file_sha256: "00".to_string(),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_lock_missing_document() {
        let store = InMemoryStore::new();
        let err = store.lock_document(Uuid::new_v4()).await.err().unwrap();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let (store, doc) = seeded().await;

        let mut uow = store.lock_document(doc.id).await.unwrap();
        assert_eq!(uow.next_cycle_number().await.unwrap(), 1);
        uow.append_cycle(record(&doc, 1)).await.unwrap();
        assert_eq!(uow.next_cycle_number().await.unwrap(), 2);
        uow.set_status(DocumentStatus::OnReview).await.unwrap();

        assert!(store.list_by_document(doc.id).await.unwrap().is_empty());
        assert_eq!(store.get_by_id(doc.id).await.unwrap().status, DocumentStatus::Pending);

        uow.commit().await.unwrap();

        assert_eq!(store.list_by_document(doc.id).await.unwrap().len(), 1);
        assert_eq!(store.get_by_id(doc.id).await.unwrap().status, DocumentStatus::OnReview);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let (store, doc) = seeded().await;

        let mut uow = store.lock_document(doc.id).await.unwrap();
        uow.append_cycle(record(&doc, 1)).await.unwrap();
        uow.set_status(DocumentStatus::OnReview).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(store.cycle_count().await, 0);
        assert_eq!(store.get_by_id(doc.id).await.unwrap().status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_cycle_number_is_constraint_error() {
        let (store, doc) = seeded().await;

        let mut uow = store.lock_document(doc.id).await.unwrap();
        uow.append_cycle(record(&doc, 1)).await.unwrap();
        let err = uow.append_cycle(record(&doc, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Constraint { .. }));
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let (store, doc) = seeded().await;

        let mut uow = store.lock_document(doc.id).await.unwrap();
        for n in 1..=3 {
            uow.append_cycle(record(&doc, n)).await.unwrap();
        }
        uow.commit().await.unwrap();

        let numbers: Vec<i32> = store
            .list_by_document(doc.id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.cycle_number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_commit_keeps_reviewer_assigned_while_locked() {
        let (store, doc) = seeded().await;
        let replacement = Uuid::new_v4();
        assert_ne!(doc.reviewer_id, Some(replacement));

        let mut uow = store.lock_document(doc.id).await.unwrap();
        store.set_reviewer(doc.id, replacement).await.unwrap();
        uow.set_status(DocumentStatus::OnReview).await.unwrap();
        uow.commit().await.unwrap();

        let after = store.get_by_id(doc.id).await.unwrap();
        assert_eq!(after.reviewer_id, Some(replacement));
        assert_eq!(after.status, DocumentStatus::OnReview);
    }

    #[tokio::test]
    async fn test_row_locks_are_released() {
        let (store, doc) = seeded().await;

        for _ in 0..3 {
            assert!(store.lock_document(Uuid::new_v4()).await.is_err());
        }
        assert_eq!(store.inner.row_lock_count().await, 0);

        let uow = store.lock_document(doc.id).await.unwrap();
        assert_eq!(store.inner.row_lock_count().await, 1);
        uow.commit().await.unwrap();
        assert_eq!(store.inner.row_lock_count().await, 0);

        let uow = store.lock_document(doc.id).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(store.inner.row_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_set_reviewer_overwrites() {
        let (store, doc) = seeded().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.set_reviewer(doc.id, first).await.unwrap();
        store.set_reviewer(doc.id, second).await.unwrap();
        let again = store.set_reviewer(doc.id, second).await.unwrap();

        assert_eq!(again.reviewer_id, Some(second));
        assert!(store.list_by_reviewer(first).await.unwrap().is_empty());
        assert_eq!(store.list_by_reviewer(second).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_topic() {
        let store = InMemoryStore::new();
        let err = store
            .create(NewDocument {
                owner_id: Uuid::new_v4(),
                kind: DocumentKind::InterimReportA,
                topic: String::new(),
                note: None,
                reviewer_id: None,
                file_key: "k".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
