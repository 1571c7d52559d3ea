//! Local filesystem blob store

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{BlobStore, StoredBlob};
use crate::errors::{AppError, Result};

/// Stores blobs as files below a root directory.
///
/// Keys are relative paths; anything that is absolute or contains `..`
/// is rejected before touching the filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create the store, making the root directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| AppError::StorageFailure {
            message: format!("cannot create storage root {}: {}", root.display(), e),
        })?;

        info!(root = %root.display(), "Local blob store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let only_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if key.is_empty() || !only_normal {
            return Err(AppError::Validation {
                message: format!("invalid blob key '{}'", key),
                field: None,
            });
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, suggested_key: &str, data: &[u8]) -> Result<StoredBlob> {
        let path = self.resolve(suggested_key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o640);

        let mut file = options.open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => AppError::StorageFailure {
                message: format!("blob '{}' already exists", suggested_key),
            },
            _ => AppError::StorageFailure {
                message: format!("cannot create blob '{}': {}", suggested_key, e),
            },
        })?;

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!(key = %suggested_key, error = %cleanup, "Failed to remove partial blob");
            }
            return Err(AppError::StorageFailure {
                message: format!("cannot write blob '{}': {}", suggested_key, e),
            });
        }

        debug!(key = %suggested_key, size = data.len(), "Blob written");
        Ok(StoredBlob::describe(suggested_key.to_string(), data))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::BlobNotFound {
                key: key.to_string(),
            },
            _ => AppError::StorageFailure {
                message: format!("cannot read blob '{}': {}", key, e),
            },
        })
    }

    /// Deleting a missing blob succeeds
    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "Blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageFailure {
                message: format!("cannot delete blob '{}': {}", key, e),
            }),
        }
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let blob = store
            .put("concept_proposal/primary/a.pdf", b"%PDF-1.4 body")
            .await
            .unwrap();
        assert_eq!(blob.size, 13);
        assert!(dir.path().join("concept_proposal/primary/a.pdf").is_file());

        let data = store.get(&blob.key).await.unwrap();
        assert_eq!(data, b"%PDF-1.4 body");

        store.delete(&blob.key).await.unwrap();
        assert!(matches!(
            store.get(&blob.key).await,
            Err(AppError::BlobNotFound { .. })
        ));
        // Second delete is a no-op
        store.delete(&blob.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        store.put("x/a.pdf", b"first").await.unwrap();
        let err = store.put("x/a.pdf", b"second").await.unwrap_err();
        assert!(matches!(err, AppError::StorageFailure { .. }));
        assert_eq!(store.get("x/a.pdf").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs")).await.unwrap();

        for key in ["../outside.pdf", "/etc/passwd", "a/../../b.pdf", ""] {
            let err = store.put(key, b"%PDF-").await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }), "key {key:?}");
        }
        assert!(!dir.path().join("outside.pdf").exists());
    }

    #[tokio::test]
    async fn test_long_client_file_name_fits_on_disk() {
        use crate::db::models::{ActorRole, DocumentKind};
        use crate::storage::{blob_key, UploadSlot};

        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let name = format!("{}.pdf", "a".repeat(200));
        let key = blob_key(
            DocumentKind::ResearchProposal,
            UploadSlot::Cycle(ActorRole::Submitter),
            uuid::Uuid::new_v4(),
            &name,
        );
        assert!(key.rsplit('/').next().unwrap().len() < 255);

        let blob = store.put(&key, b"%PDF-1.7 long name").await.unwrap();
        assert!(blob.key.ends_with(".pdf"));
        assert_eq!(store.get(&blob.key).await.unwrap(), b"%PDF-1.7 long name");
    }
}
