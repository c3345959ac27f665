use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No checksum file found for {0}")]
    MissingChecksum(PathBuf),

    #[error("Checksum mismatch for {file}! ({expected} != {actual})")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("A file with the name {0} already exists in the preservation store.")]
    AlreadyExists(PathBuf),

    #[error("{0} modified, transaction cancelled.")]
    ModifiedDuringCopy(PathBuf),

    #[error("{0} disappeared before it could be moved")]
    Vanished(PathBuf),
}

impl DropboxError {
    /// Terminal outcomes are written to the file's log and never retried;
    /// anything else is retried on a later pass.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DropboxError::ChecksumMismatch { .. } | DropboxError::AlreadyExists(_)
        )
    }
}
