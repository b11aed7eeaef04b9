use std::sync::Arc;

use object_store::path::Path as StoragePath;
use object_store::{ObjectStore, memory::InMemory};

/// Errors produced by the storage client.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Thin client over any `object_store` backend.
///
/// The bucket is a display label for logs and destination locations; key
/// layout inside the store is decided by the destination policy.
#[derive(Clone)]
pub struct ObjectStorage {
    pub(crate) store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// In-memory storage for tests and development.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "convoy-local")
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Downloads an object's bytes.
    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let result = self.store.get(&StoragePath::from(key)).await?;
        let bytes = result.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Returns `true` if an object exists under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.store.head(&StoragePath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exists_is_false_for_missing_keys() {
        let storage = ObjectStorage::in_memory();
        assert!(!storage.exists("image/nothing-here").await.unwrap());
    }

    #[tokio::test]
    async fn fetch_missing_key_errors() {
        let storage = ObjectStorage::in_memory();
        assert!(storage.fetch("image/nothing-here").await.is_err());
    }

    #[tokio::test]
    async fn fetch_returns_stored_bytes() {
        let storage = ObjectStorage::in_memory();
        storage
            .store
            .put(&StoragePath::from("a/b"), b"payload".to_vec().into())
            .await
            .unwrap();

        assert!(storage.exists("a/b").await.unwrap());
        assert_eq!(storage.fetch("a/b").await.unwrap(), b"payload");
    }
}
