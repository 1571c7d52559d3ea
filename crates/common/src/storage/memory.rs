//! In-memory blob store, for tests and throwaway instances

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, StoredBlob};
use crate::errors::{AppError, Result};

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.read().await.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, suggested_key: &str, data: &[u8]) -> Result<StoredBlob> {
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(suggested_key) {
            return Err(AppError::StorageFailure {
                message: format!("blob '{}' already exists", suggested_key),
            });
        }
        blobs.insert(suggested_key.to_string(), data.to_vec());
        Ok(StoredBlob::describe(suggested_key.to_string(), data))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::BlobNotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
