use crate::transfer::error::StoreError;
use crate::transfer::store::{ObjectStore, RemoteObject};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use md5::{Digest, Md5};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `FakeObjectStore` is an in-memory object store for testing purposes.
/// It verifies `Content-MD5` like S3 does and assigns single-part etags (hex MD5).
#[derive(Clone, Default)]
pub struct FakeObjectStore {
    data: Arc<Mutex<HashMap<String, (Bytes, String)>>>,
    fail_keys: Arc<Mutex<HashSet<String>>>,
    puts: Arc<Mutex<usize>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a transport failure for every request on `key`
    pub async fn fake_fail_key(&self, key: &str) {
        self.fail_keys.lock().await.insert(key.to_string());
    }

    /// Place an object as if someone else had uploaded it
    pub async fn fake_add_object(&self, key: &str, data: &[u8]) {
        let etag = hex::encode(Md5::digest(data));
        self.data
            .lock()
            .await
            .insert(key.to_string(), (Bytes::copy_from_slice(data), etag));
    }

    pub async fn fake_object(&self, key: &str) -> Option<Bytes> {
        self.data.lock().await.get(key).map(|(bytes, _)| bytes.clone())
    }

    pub async fn fake_object_count(&self) -> usize {
        self.data.lock().await.len()
    }

    /// Number of puts the store accepted
    pub async fn fake_put_count(&self) -> usize {
        *self.puts.lock().await
    }

    async fn check_failure(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_keys.lock().await.contains(key) {
            return Err(StoreError::Network(format!("{key}: simulated connection reset")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError> {
        self.check_failure(key).await?;
        let data = self.data.lock().await;
        Ok(data.get(key).map(|(bytes, etag)| RemoteObject {
            etag: etag.clone(),
            size: bytes.len() as u64,
        }))
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        content_md5: &str,
        overwrite: bool,
    ) -> Result<String, StoreError> {
        self.check_failure(key).await?;
        let bytes = Bytes::from(tokio::fs::read(path).await?);

        let digest = Md5::digest(&bytes);
        if STANDARD.encode(digest) != content_md5 {
            return Err(StoreError::Other(anyhow::anyhow!(
                "BadDigest: Content-MD5 does not match the uploaded bytes of {key}"
            )));
        }

        let mut data = self.data.lock().await;
        if !overwrite && data.contains_key(key) {
            return Err(StoreError::Conflict(key.to_string()));
        }

        let etag = hex::encode(digest);
        data.insert(key.to_string(), (bytes, etag.clone()));
        *self.puts.lock().await += 1;
        Ok(etag)
    }

    async fn remove_object(&self, key: &str) -> Result<(), StoreError> {
        match self.data.lock().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::ObjectNotFound(key.to_string())),
        }
    }
}
