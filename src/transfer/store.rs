use crate::transfer::error::StoreError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// What the store reports about an object it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub etag: String,
    pub size: u64,
}

/// Durable remote storage that archives are uploaded to
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Look up an object without fetching it; `None` if it does not exist
    ///
    /// * `key` - The object key
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError>;

    /// Upload a local file and return the etag the store assigned to it
    ///
    /// * `key` - The object key
    /// * `path` - Local file holding the bytes
    /// * `content_md5` - Base64 MD5 of the file, checked by the store on receipt
    /// * `overwrite` - When false the put only succeeds if no object exists under `key`,
    ///   otherwise it fails with [`StoreError::Conflict`]
    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        content_md5: &str,
        overwrite: bool,
    ) -> Result<String, StoreError>;

    /// Remove an object from storage (test-only)
    #[cfg(test)]
    async fn remove_object(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError> {
        (**self).head_object(key).await
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        content_md5: &str,
        overwrite: bool,
    ) -> Result<String, StoreError> {
        (**self).put_object(key, path, content_md5, overwrite).await
    }

    #[cfg(test)]
    async fn remove_object(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove_object(key).await
    }
}
