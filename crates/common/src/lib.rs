//! ThesisTrack Common Library
//!
//! Shared code for the ThesisTrack services including:
//! - Database models, migrations and the Postgres repository
//! - The review-revision cycle engine
//! - Blob storage and upload policy
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod metrics;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use directory::ActorDirectory;
pub use errors::{AppError, Result};
pub use storage::BlobStore;
pub use workflow::{SubmissionCoordinator, WorkflowStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
