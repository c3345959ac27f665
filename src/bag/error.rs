use crate::payload::PayloadError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling or serializing a bag
#[derive(Error, Debug)]
pub enum BagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate payload path: {0}")]
    DuplicatePath(String),

    #[error("Bag already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Failed to write archive: {0}")]
    Archive(String),
}
