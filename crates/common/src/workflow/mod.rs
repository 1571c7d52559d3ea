//! Review-revision cycle engine
//!
//! Provides:
//! - Status transition rules
//! - Storage traits for documents and the cycle ledger
//! - An in-memory store
//! - The submission coordinator that ties blobs and rows together

mod coordinator;
mod memory;
mod status;
mod store;

pub use coordinator::{NewUpload, Submission, SubmissionCoordinator};
pub use memory::InMemoryStore;
pub use status::{StatusController, Trigger};
pub use store::{
    CycleLedger, DocumentRepository, NewCycleRecord, NewDocument, UnitOfWork, WorkflowStore,
};

pub(crate) use store::duplicate_cycle;
