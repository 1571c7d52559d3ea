//! Submission coordinator
//!
//! Runs the review-revision cycle for every document kind: policy check,
//! row lock, linkage and transition checks, blob write, ledger append, status
//! flip, commit. The blob write cannot join the database transaction, so any
//! failure after it deletes the blob again before the error is returned.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::status::{StatusController, Trigger};
use super::store::{NewCycleRecord, NewDocument, UnitOfWork, WorkflowStore};
use crate::db::models::{ActorRole, CycleRecord, Document, DocumentKind, DocumentStatus};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::storage::{blob_key, BlobStore, StoredBlob, UploadPolicy, UploadSlot};

/// A reviewer or submitter upload against an existing document
#[derive(Debug, Clone)]
pub struct Submission {
    pub document_id: Uuid,
    pub actor_id: Uuid,
    pub role: ActorRole,
    pub file_name: String,
    pub data: Vec<u8>,
    pub note: Option<String>,
}

/// The student's initial upload that creates a document
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub owner_id: Uuid,
    pub kind: DocumentKind,
    pub topic: String,
    pub note: Option<String>,
    pub reviewer_id: Option<Uuid>,
    pub file_name: String,
    pub data: Vec<u8>,
}

pub struct SubmissionCoordinator {
    store: Arc<dyn WorkflowStore>,
    blobs: Arc<dyn BlobStore>,
    policy: UploadPolicy,
    status: StatusController,
}

impl SubmissionCoordinator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        blobs: Arc<dyn BlobStore>,
        policy: UploadPolicy,
        status: StatusController,
    ) -> Self {
        Self {
            store,
            blobs,
            policy,
            status,
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    // =========================================================================
    // Submissions
    // =========================================================================

    /// Accept a new cycle upload. Either the blob, the cycle record and the
    /// status change all persist, or none of them do.
    #[instrument(
        skip_all,
        fields(
            document_id = %submission.document_id,
            actor_id = %submission.actor_id,
            role = %submission.role,
            size = submission.data.len()
        )
    )]
    pub async fn submit(&self, submission: Submission) -> Result<CycleRecord> {
        let started = Instant::now();
        let role = submission.role;
        let mut kind = None;

        let result = self.run_submission(submission, &mut kind).await;

        let kind_label = kind.map(|k: DocumentKind| k.as_str()).unwrap_or("unknown");
        metrics::record_submission(kind_label, role.as_str(), outcome(&result), started.elapsed());

        match &result {
            Ok(record) => info!(
                cycle_id = %record.id,
                cycle_number = record.cycle_number,
                "Submission accepted"
            ),
            Err(e) => warn!(error = %e, "Submission failed"),
        }
        result
    }

    async fn run_submission(
        &self,
        submission: Submission,
        kind: &mut Option<DocumentKind>,
    ) -> Result<CycleRecord> {
        self.policy.check(&submission.file_name, &submission.data)?;

        let uow = self.store.lock_document(submission.document_id).await?;
        let document = uow.document().clone();
        *kind = Some(document.kind);

        if !document.is_linked(submission.actor_id, submission.role) {
            let err = AppError::Unauthorized {
                message: format!(
                    "actor {} is not the {} of document {}",
                    submission.actor_id, submission.role, document.id
                ),
            };
            return Err(abort(uow, err).await);
        }

        let transition = self
            .status
            .ensure(document.status, DocumentStatus::OnReview, Trigger::Submission);
        if let Err(err) = transition {
            return Err(abort(uow, err).await);
        }

        let key = blob_key(
            document.kind,
            UploadSlot::Cycle(submission.role),
            submission.actor_id,
            &submission.file_name,
        );
        let blob = match self.blobs.put(&key, &submission.data).await {
            Ok(blob) => blob,
            Err(err) => return Err(abort(uow, err).await),
        };
        metrics::record_blob_written(self.blobs.backend(), blob.size);

        self.finish_submission(uow, &submission, blob).await
    }

    /// Steps that run with the blob already written; every error path here
    /// removes it again.
    async fn finish_submission(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        submission: &Submission,
        blob: StoredBlob,
    ) -> Result<CycleRecord> {
        let staged = stage_cycle(uow.as_mut(), submission, &blob).await;

        let outcome = match staged {
            Ok(record) => uow.commit().await.map(|()| record),
            Err(err) => Err(abort(uow, err).await),
        };

        if outcome.is_err() {
            self.discard_blob(&blob.key).await;
        }
        outcome
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Approve, reject, or reopen a document. No ledger entry is written.
    #[instrument(skip_all, fields(document_id = %document_id, requested = %decision))]
    pub async fn decide(&self, document_id: Uuid, decision: DocumentStatus) -> Result<Document> {
        let result = self.run_decision(document_id, decision).await;
        metrics::record_decision(decision.as_str(), outcome(&result));

        if let Ok(document) = &result {
            info!(status = %document.status, "Decision recorded");
        }
        result
    }

    /// Decide from a client-supplied string. Anything that is not a status
    /// name is an invalid transition from the document's current status.
    pub async fn decide_named(&self, document_id: Uuid, decision: &str) -> Result<Document> {
        match decision.parse::<DocumentStatus>() {
            Ok(status) => self.decide(document_id, status).await,
            Err(_) => {
                let current = self.store.get_by_id(document_id).await?;
                metrics::record_decision("unknown", "rejected");
                Err(AppError::InvalidTransition {
                    from: current.status.to_string(),
                    to: decision.trim().to_string(),
                })
            }
        }
    }

    async fn run_decision(&self, document_id: Uuid, decision: DocumentStatus) -> Result<Document> {
        let mut uow = self.store.lock_document(document_id).await?;
        let current = uow.document().status;

        if let Err(err) = self.status.ensure(current, decision, Trigger::Decision) {
            return Err(abort(uow, err).await);
        }

        let updated = match uow.set_status(decision).await {
            Ok(document) => document,
            Err(err) => return Err(abort(uow, err).await),
        };
        uow.commit().await?;

        debug!(from = %current, to = %decision, "Status changed");
        Ok(updated)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Store the primary file and create the document in status pending
    #[instrument(
        skip_all,
        fields(owner_id = %upload.owner_id, kind = %upload.kind, size = upload.data.len())
    )]
    pub async fn open_document(&self, upload: NewUpload) -> Result<Document> {
        self.policy.check(&upload.file_name, &upload.data)?;

        let new = NewDocument {
            owner_id: upload.owner_id,
            kind: upload.kind,
            topic: upload.topic,
            note: upload.note,
            reviewer_id: upload.reviewer_id,
            file_key: blob_key(
                upload.kind,
                UploadSlot::Primary,
                upload.owner_id,
                &upload.file_name,
            ),
        };
        new.validate()?;

        let blob = self.blobs.put(&new.file_key, &upload.data).await?;
        metrics::record_blob_written(self.blobs.backend(), blob.size);

        match self.store.create(new).await {
            Ok(document) => {
                metrics::record_document_opened(document.kind.as_str());
                info!(document_id = %document.id, "Document opened");
                Ok(document)
            }
            Err(err) => {
                self.discard_blob(&blob.key).await;
                Err(err)
            }
        }
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<Document> {
        self.store.get_by_id(document_id).await
    }

    /// Exchange history, most recent cycle first
    pub async fn list_cycles(&self, document_id: Uuid) -> Result<Vec<CycleRecord>> {
        // Distinguish "no such document" from "no cycles yet"
        self.store.get_by_id(document_id).await?;
        self.store.list_by_document(document_id).await
    }

    pub async fn assign_reviewer(&self, document_id: Uuid, reviewer_id: Uuid) -> Result<Document> {
        if reviewer_id.is_nil() {
            return Err(AppError::MissingField {
                field: "reviewer_id".to_string(),
            });
        }
        let document = self.store.set_reviewer(document_id, reviewer_id).await?;
        info!(document_id = %document_id, reviewer_id = %reviewer_id, "Reviewer assigned");
        Ok(document)
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    pub async fn primary_file(&self, document_id: Uuid) -> Result<(Document, Vec<u8>)> {
        let document = self.store.get_by_id(document_id).await?;
        let data = self.blobs.get(&document.file_key).await?;
        Ok((document, data))
    }

    pub async fn cycle_file(&self, cycle_id: Uuid) -> Result<(CycleRecord, Vec<u8>)> {
        let record = self.store.get_cycle(cycle_id).await?;
        let data = self.blobs.get(&record.file_key).await?;
        Ok((record, data))
    }

    /// Best-effort compensating delete. A failure is logged and counted but
    /// never replaces the error that triggered it.
    async fn discard_blob(&self, key: &str) {
        let backend = self.blobs.backend();
        match self.blobs.delete(key).await {
            Ok(()) => {
                info!(key = %key, "Removed blob of failed submission");
                metrics::record_blob_cleanup(backend, true);
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to remove orphaned blob");
                metrics::record_blob_cleanup(backend, false);
            }
        }
    }
}

async fn stage_cycle(
    uow: &mut dyn UnitOfWork,
    submission: &Submission,
    blob: &StoredBlob,
) -> Result<CycleRecord> {
    let cycle_number = uow.next_cycle_number().await?;
    let record = uow
        .append_cycle(NewCycleRecord {
            document_id: submission.document_id,
            actor_id: submission.actor_id,
            actor_role: submission.role,
            cycle_number,
            file_key: blob.key.clone(),
            file_size: blob.size,
            file_sha256: blob.sha256.clone(),
            note: submission.note.clone(),
        })
        .await?;
    uow.set_status(DocumentStatus::OnReview).await?;
    Ok(record)
}

/// Roll back and hand back the error that caused it
async fn abort(uow: Box<dyn UnitOfWork>, err: AppError) -> AppError {
    if let Err(rollback) = uow.rollback().await {
        warn!(error = %rollback, "Rollback failed");
    }
    err
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_client_error() => "rejected",
        Err(_) => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlobStore;
    use crate::workflow::memory::InMemoryStore;
    use crate::workflow::store::{CycleLedger, DocumentRepository};
    use async_trait::async_trait;
    use std::collections::HashSet;

    const PDF: &[u8] = b"%PDF-1.5\n% thesis draft\n%%EOF\n";

    struct Fixture {
        coordinator: Arc<SubmissionCoordinator>,
        store: InMemoryStore,
        blobs: Arc<InMemoryBlobStore>,
        document: Document,
        student: Uuid,
        reviewer: Uuid,
    }

    async fn fixture_with(allow_reopen: bool) -> Fixture {
        let store = InMemoryStore::new();
        let blobs = Arc::new(InMemoryBlobStore::new());
        let coordinator = Arc::new(SubmissionCoordinator::new(
            Arc::new(store.clone()),
            blobs.clone(),
            UploadPolicy::default(),
            StatusController::new(allow_reopen),
        ));

        let student = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let document = coordinator
            .open_document(NewUpload {
                owner_id: student,
                kind: DocumentKind::ConceptProposal,
                topic: "Low-power LoRa mesh for paddy fields".to_string(),
                note: None,
                reviewer_id: Some(reviewer),
                file_name: "concept.pdf".to_string(),
                data: PDF.to_vec(),
            })
            .await
            .unwrap();

        Fixture {
            coordinator,
            store,
            blobs,
            document,
            student,
            reviewer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(true).await
    }

    fn submission(document_id: Uuid, actor_id: Uuid, role: ActorRole) -> Submission {
        Submission {
            document_id,
            actor_id,
            role,
            file_name: "notes.pdf".to_string(),
            data: PDF.to_vec(),
            note: Some("see page 4".to_string()),
        }
    }

    #[tokio::test]
    async fn test_review_revision_scenario() {
        let fx = fixture().await;
        let id = fx.document.id;
        assert_eq!(fx.document.status, DocumentStatus::Pending);

        let first = fx
            .coordinator
            .submit(submission(id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        assert_eq!(first.cycle_number, 1);
        assert_eq!(
            fx.coordinator.get_document(id).await.unwrap().status,
            DocumentStatus::OnReview
        );

        let second = fx
            .coordinator
            .submit(submission(id, fx.student, ActorRole::Submitter))
            .await
            .unwrap();
        assert_eq!(second.cycle_number, 2);
        assert!(second.file_key.contains("/revision/REVISION_CONCEPT_"));

        let decided = fx
            .coordinator
            .decide(id, DocumentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(decided.status, DocumentStatus::Approved);

        let cycles = fx.coordinator.list_cycles(id).await.unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].cycle_number, 2);
        assert_eq!(cycles[1].actor_role, ActorRole::Reviewer);

        // Primary plus two cycle files
        assert_eq!(fx.blobs.len().await, 3);
    }

    #[tokio::test]
    async fn test_cycle_records_file_digest() {
        let fx = fixture().await;
        let record = fx
            .coordinator
            .submit(submission(fx.document.id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();

        let (_, data) = fx.coordinator.cycle_file(record.id).await.unwrap();
        assert_eq!(data, PDF);
        assert_eq!(record.file_size, PDF.len() as i64);
        assert_eq!(record.file_sha256, StoredBlob::describe(String::new(), PDF).sha256);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_concurrent_submissions_get_one_and_two() {
        let fx = fixture().await;
        let id = fx.document.id;

        let a = {
            let c = fx.coordinator.clone();
            let s = submission(id, fx.reviewer, ActorRole::Reviewer);
            tokio::spawn(async move { c.submit(s).await })
        };
        let b = {
            let c = fx.coordinator.clone();
            let s = submission(id, fx.student, ActorRole::Submitter);
            tokio::spawn(async move { c.submit(s).await })
        };

        let mut numbers = vec![
            a.await.unwrap().unwrap().cycle_number,
            b.await.unwrap().unwrap().cycle_number,
        ];
        numbers.sort();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_are_contiguous() {
        let fx = fixture().await;
        let id = fx.document.id;
        let n = 24;

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let c = fx.coordinator.clone();
                let s = if i % 2 == 0 {
                    submission(id, fx.reviewer, ActorRole::Reviewer)
                } else {
                    submission(id, fx.student, ActorRole::Submitter)
                };
                tokio::spawn(async move { c.submit(s).await })
            })
            .collect();

        for joined in futures::future::join_all(handles).await {
            joined.unwrap().unwrap();
        }

        let numbers: HashSet<i32> = fx
            .coordinator
            .list_cycles(id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.cycle_number)
            .collect();
        assert_eq!(numbers, (1..=n).collect::<HashSet<i32>>());
    }

    #[tokio::test]
    async fn test_documents_number_independently() {
        let fx = fixture().await;
        let other = fx
            .coordinator
            .open_document(NewUpload {
                owner_id: fx.student,
                kind: DocumentKind::InterimReportA,
                topic: "Progress report".to_string(),
                note: None,
                reviewer_id: Some(fx.reviewer),
                file_name: "report.pdf".to_string(),
                data: PDF.to_vec(),
            })
            .await
            .unwrap();

        fx.coordinator
            .submit(submission(fx.document.id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        let record = fx
            .coordinator
            .submit(submission(other.id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        assert_eq!(record.cycle_number, 1);
    }

    #[tokio::test]
    async fn test_unlinked_actor_is_unauthorized() {
        let fx = fixture().await;
        let stranger = Uuid::new_v4();

        let err = fx
            .coordinator
            .submit(submission(fx.document.id, stranger, ActorRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));

        // The student cannot act as reviewer either
        let err = fx
            .coordinator
            .submit(submission(fx.document.id, fx.student, ActorRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));

        assert_eq!(fx.store.cycle_count().await, 0);
        assert_eq!(fx.blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_reviewer_must_be_assigned() {
        let fx = fixture().await;
        let unassigned = fx
            .coordinator
            .open_document(NewUpload {
                owner_id: fx.student,
                kind: DocumentKind::ResearchProposal,
                topic: "Proposal".to_string(),
                note: None,
                reviewer_id: None,
                file_name: "proposal.pdf".to_string(),
                data: PDF.to_vec(),
            })
            .await
            .unwrap();

        let err = fx
            .coordinator
            .submit(submission(unassigned.id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));

        fx.coordinator
            .assign_reviewer(unassigned.id, fx.reviewer)
            .await
            .unwrap();
        let record = fx
            .coordinator
            .submit(submission(unassigned.id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        assert_eq!(record.cycle_number, 1);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let fx = fixture().await;
        let missing = Uuid::new_v4();

        let err = fx
            .coordinator
            .submit(submission(missing, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));

        let err = fx
            .coordinator
            .decide(missing, DocumentStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));

        assert!(fx.coordinator.list_cycles(missing).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_decisions_leave_document_untouched() {
        let fx = fixture().await;
        let id = fx.document.id;

        // Nothing has been reviewed yet
        let err = fx
            .coordinator
            .decide(id, DocumentStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        fx.coordinator
            .submit(submission(id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        let before = fx.coordinator.get_document(id).await.unwrap();

        for bad in ["pending", "archived", "", "on_review"] {
            let err = fx.coordinator.decide_named(id, bad).await.unwrap_err();
            assert!(
                matches!(err, AppError::InvalidTransition { .. }),
                "decision {bad:?}"
            );
        }

        let after = fx.coordinator.get_document(id).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_submission_reopens_decided_document() {
        let fx = fixture().await;
        let id = fx.document.id;

        fx.coordinator
            .submit(submission(id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        fx.coordinator
            .decide_named(id, "rejected")
            .await
            .unwrap();

        let record = fx
            .coordinator
            .submit(submission(id, fx.student, ActorRole::Submitter))
            .await
            .unwrap();
        assert_eq!(record.cycle_number, 2);
        assert_eq!(
            fx.coordinator.get_document(id).await.unwrap().status,
            DocumentStatus::OnReview
        );

        fx.coordinator
            .decide(id, DocumentStatus::Approved)
            .await
            .unwrap();
        let reopened = fx
            .coordinator
            .decide_named(id, "on review")
            .await
            .unwrap();
        assert_eq!(reopened.status, DocumentStatus::OnReview);
    }

    #[tokio::test]
    async fn test_reopen_disabled() {
        let fx = fixture_with(false).await;
        let id = fx.document.id;

        fx.coordinator
            .submit(submission(id, fx.reviewer, ActorRole::Reviewer))
            .await
            .unwrap();
        fx.coordinator
            .decide(id, DocumentStatus::Approved)
            .await
            .unwrap();

        let err = fx
            .coordinator
            .submit(submission(id, fx.student, ActorRole::Submitter))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(fx.store.cycle_count().await, 1);
        // No blob left behind for the refused upload
        assert_eq!(fx.blobs.len().await, 2);
    }

    #[tokio::test]
    async fn test_policy_rejects_before_any_write() {
        let fx = fixture().await;
        let mut bad = submission(fx.document.id, fx.reviewer, ActorRole::Reviewer);
        bad.file_name = "notes.docx".to_string();

        let err = fx.coordinator.submit(bad).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(fx.blobs.len().await, 1);
        assert_eq!(fx.store.cycle_count().await, 0);
    }

    // -------------------------------------------------------------------------
    // Failure injection
    // -------------------------------------------------------------------------

    struct BrokenBlobStore;

    #[async_trait]
    impl BlobStore for BrokenBlobStore {
        async fn put(&self, _suggested_key: &str, _data: &[u8]) -> Result<StoredBlob> {
            Err(AppError::StorageFailure {
                message: "disk full".to_string(),
            })
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            Err(AppError::BlobNotFound {
                key: key.to_string(),
            })
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_blob_failure_changes_nothing() {
        let store = InMemoryStore::new();
        let student = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let document = store
            .create(NewDocument {
                owner_id: student,
                kind: DocumentKind::InterimReportB,
                topic: "Final chapter".to_string(),
                note: None,
                reviewer_id: Some(reviewer),
                file_key: "interim_report_b/primary/seed.pdf".to_string(),
            })
            .await
            .unwrap();

        let coordinator = SubmissionCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(BrokenBlobStore),
            UploadPolicy::default(),
            StatusController::default(),
        );

        let err = coordinator
            .submit(submission(document.id, reviewer, ActorRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageFailure { .. }));
        assert_eq!(store.cycle_count().await, 0);
        assert_eq!(
            store.get_by_id(document.id).await.unwrap().status,
            DocumentStatus::Pending
        );

        // The lock was released with the failed unit of work
        assert!(coordinator.store().lock_document(document.id).await.is_ok());
    }

    /// Delegates to an in-memory store but refuses every ledger append
    #[derive(Clone)]
    struct RefusingLedger {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl DocumentRepository for RefusingLedger {
        async fn create(&self, new: NewDocument) -> Result<Document> {
            self.inner.create(new).await
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Document> {
            self.inner.get_by_id(id).await
        }

        async fn set_status(&self, id: Uuid, status: DocumentStatus) -> Result<Document> {
            self.inner.set_status(id, status).await
        }

        async fn set_reviewer(&self, id: Uuid, reviewer_id: Uuid) -> Result<Document> {
            self.inner.set_reviewer(id, reviewer_id).await
        }

        async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
            self.inner.list_by_owner(owner_id).await
        }

        async fn list_by_reviewer(&self, reviewer_id: Uuid) -> Result<Vec<Document>> {
            self.inner.list_by_reviewer(reviewer_id).await
        }
    }

    #[async_trait]
    impl CycleLedger for RefusingLedger {
        async fn list_by_document(&self, document_id: Uuid) -> Result<Vec<CycleRecord>> {
            self.inner.list_by_document(document_id).await
        }

        async fn get_cycle(&self, id: Uuid) -> Result<CycleRecord> {
            self.inner.get_cycle(id).await
        }
    }

    #[async_trait]
    impl WorkflowStore for RefusingLedger {
        async fn lock_document(&self, id: Uuid) -> Result<Box<dyn UnitOfWork>> {
            let uow = self.inner.lock_document(id).await?;
            Ok(Box::new(RefusingUnitOfWork { inner: uow }))
        }
    }

    struct RefusingUnitOfWork {
        inner: Box<dyn UnitOfWork>,
    }

    #[async_trait]
    impl UnitOfWork for RefusingUnitOfWork {
        fn document(&self) -> &Document {
            self.inner.document()
        }

        async fn next_cycle_number(&mut self) -> Result<i32> {
            self.inner.next_cycle_number().await
        }

        async fn append_cycle(&mut self, record: NewCycleRecord) -> Result<CycleRecord> {
            Err(AppError::Constraint {
                message: format!("cycle {} rejected", record.cycle_number),
            })
        }

        async fn set_status(&mut self, status: DocumentStatus) -> Result<Document> {
            self.inner.set_status(status).await
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_removes_blob() {
        let store = RefusingLedger {
            inner: InMemoryStore::new(),
        };
        let blobs = Arc::new(InMemoryBlobStore::new());
        let coordinator = SubmissionCoordinator::new(
            Arc::new(store.clone()),
            blobs.clone(),
            UploadPolicy::default(),
            StatusController::default(),
        );

        let student = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let document = coordinator
            .open_document(NewUpload {
                owner_id: student,
                kind: DocumentKind::ResearchProposal,
                topic: "Groundwater modelling".to_string(),
                note: None,
                reviewer_id: Some(reviewer),
                file_name: "proposal.pdf".to_string(),
                data: PDF.to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(blobs.len().await, 1);

        let err = coordinator
            .submit(submission(document.id, reviewer, ActorRole::Reviewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Constraint { .. }));

        // Only the primary file survives
        assert_eq!(blobs.len().await, 1);
        assert!(blobs.contains(&document.file_key).await);
        assert_eq!(
            store.get_by_id(document.id).await.unwrap().status,
            DocumentStatus::Pending
        );
        assert_eq!(store.inner.cycle_count().await, 0);
    }

    #[tokio::test]
    async fn test_open_document_validates_before_writing() {
        let store = InMemoryStore::new();
        let blobs = Arc::new(InMemoryBlobStore::new());
        let coordinator = SubmissionCoordinator::new(
            Arc::new(store),
            blobs.clone(),
            UploadPolicy::default(),
            StatusController::default(),
        );

        let err = coordinator
            .open_document(NewUpload {
                owner_id: Uuid::new_v4(),
                kind: DocumentKind::ConceptProposal,
                topic: "   ".to_string(),
                note: None,
                reviewer_id: None,
                file_name: "concept.pdf".to_string(),
                data: PDF.to_vec(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField { .. }));
        assert!(blobs.is_empty().await);
    }
}
