pub mod error;
#[cfg(test)]
pub mod fake;
pub mod models;
pub mod repository;
pub mod sqlite;
pub mod visibility;

pub use error::LedgerError;
#[cfg(test)]
pub use fake::FakeLedger;
pub use models::{Candidate, IngestEvent};
pub use repository::{MetadataRepository, ProvenanceLedger};
pub use sqlite::SqliteLedger;
pub use visibility::{wait_for_event, wait_until_visible, VisibilityPolicy};
