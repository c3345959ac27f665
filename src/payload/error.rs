use thiserror::Error;

/// Errors raised while enumerating or staging the payload of an item
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("No payload found for {0}")]
    NotFound(String),

    #[error("IO error while staging payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Invalid logical path: {0}")]
    InvalidPath(String),

    #[error("Metadata lookup failed: {0}")]
    Metadata(String),
}
