use thiserror::Error;

/// Errors from the metadata repository and provenance ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to open ledger: {0}")]
    OpenError(String),

    #[error("Ledger operation failed: {0}")]
    OperationError(String),

    #[error("Item {0} not found")]
    NotFound(String),

    #[error("Ledger is locked")]
    Locked,

    #[error("Gave up waiting for {what} to become visible after {waited_ms} ms")]
    VisibilityTimeout { what: String, waited_ms: u128 },
}
