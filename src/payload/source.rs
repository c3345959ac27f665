use crate::payload::error::PayloadError;
use crate::payload::staging::StagingArea;
use async_trait::async_trait;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// One payload file of a bag: where it goes inside `data/` and where its bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    /// Path relative to the bag's `data/` directory, `/`-separated
    pub logical_path: String,
    /// Local file holding the bytes
    pub path: PathBuf,
}

impl PayloadEntry {
    pub fn new(logical_path: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            logical_path: logical_path.into(),
            path: path.into(),
        }
    }

    /// Open the byte source for streaming reads
    pub fn open(&self) -> Result<File, PayloadError> {
        File::open(&self.path).map_err(PayloadError::Io)
    }
}

/// Source of the payload files for one logical item.
///
/// Implementations that must materialize bytes locally (downloads, exports)
/// allocate their files from the supplied [`StagingArea`], which owns them and
/// deletes them once the bag is serialized or abandoned.
#[async_trait]
pub trait PayloadSource: Send + Sync + 'static {
    /// List the payload entries of `item_id` in enumeration order
    ///
    /// * `item_id` - The stable identifier of the item
    /// * `staging` - Scratch space for files that only exist for this bag
    async fn list_payload_entries(
        &self,
        item_id: &str,
        staging: &StagingArea,
    ) -> Result<Vec<PayloadEntry>, PayloadError>;
}

#[async_trait]
impl<T: PayloadSource + ?Sized> PayloadSource for Arc<T> {
    async fn list_payload_entries(
        &self,
        item_id: &str,
        staging: &StagingArea,
    ) -> Result<Vec<PayloadEntry>, PayloadError> {
        (**self).list_payload_entries(item_id, staging).await
    }
}

/// Reject logical paths that would escape `data/` or collapse to nothing
pub fn validate_logical_path(logical_path: &str) -> Result<(), PayloadError> {
    if logical_path.is_empty() || logical_path.contains('\\') {
        return Err(PayloadError::InvalidPath(logical_path.to_string()));
    }

    let path = Path::new(logical_path);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(PayloadError::InvalidPath(logical_path.to_string())),
        }
    }

    Ok(())
}
