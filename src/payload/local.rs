use crate::payload::error::PayloadError;
use crate::payload::source::{validate_logical_path, PayloadEntry, PayloadSource};
use crate::payload::staging::StagingArea;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::debug;

/// Payload taken from a local dump: every file below `<root>/<item_id>/`
#[derive(Debug, Clone)]
pub struct LocalDumpSource {
    root: PathBuf,
}

impl LocalDumpSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collect(dir: &Path, prefix: &str, entries: &mut Vec<PayloadEntry>) -> Result<(), PayloadError> {
        for dir_entry in std::fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let logical_path = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let file_type = dir_entry.file_type()?;
            if file_type.is_dir() {
                Self::collect(&dir_entry.path(), &logical_path, entries)?;
            } else if file_type.is_file() {
                entries.push(PayloadEntry::new(logical_path, dir_entry.path()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PayloadSource for LocalDumpSource {
    async fn list_payload_entries(
        &self,
        item_id: &str,
        _staging: &StagingArea,
    ) -> Result<Vec<PayloadEntry>, PayloadError> {
        validate_logical_path(item_id)?;
        let item_dir = self.root.join(item_id);
        if !item_dir.is_dir() {
            return Err(PayloadError::NotFound(item_dir.display().to_string()));
        }

        debug!("Enumerating local payload in {}", item_dir.display());
        let entries = task::spawn_blocking(move || {
            let mut entries = Vec::new();
            Self::collect(&item_dir, "", &mut entries)?;
            entries.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
            Ok::<_, PayloadError>(entries)
        })
        .await
        .map_err(|e| PayloadError::Io(std::io::Error::other(format!("Task panic: {e}"))))??;

        if entries.is_empty() {
            return Err(PayloadError::NotFound(item_id.to_string()));
        }

        Ok(entries)
    }
}
