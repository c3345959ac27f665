use thiserror::Error;

/// Errors that can occur when talking to the remote object store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object {0} already exists")]
    Conflict(String),

    #[error("Object with key {0} not found")]
    ObjectNotFound(String),

    #[error("Access denied for object {0}: {1}")]
    AccessDenied(String, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error reading archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other storage error: {0}")]
    Other(#[from] anyhow::Error),
}
