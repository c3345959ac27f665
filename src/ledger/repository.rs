use crate::ledger::error::LedgerError;
use crate::ledger::models::{Candidate, IngestEvent};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Key/value view of the repository holding the items being preserved
#[async_trait]
pub trait MetadataRepository: Send + Sync + 'static {
    /// Get all properties recorded for an item
    ///
    /// * `item_id` - The item to describe
    async fn get_properties(&self, item_id: &str)
        -> Result<BTreeMap<String, String>, LedgerError>;

    /// Record an ingestion event against its item
    async fn create_ingest_event(&self, event: &IngestEvent) -> Result<(), LedgerError>;
}

/// Queryable history of what has been submitted
#[async_trait]
pub trait ProvenanceLedger: Send + Sync + 'static {
    /// Candidates not yet sent, ordered by sort key
    ///
    /// * `after` - Only return candidates whose sort key is greater than this
    /// * `limit` - Page size
    async fn candidates_after(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, LedgerError>;

    /// Whether any ingestion event exists for the item
    async fn has_been_sent(&self, item_id: &str) -> Result<bool, LedgerError>;

    /// Total payload bytes over all recorded ingestion events
    async fn payload_bytes_submitted(&self) -> Result<u64, LedgerError>;

    /// Whether an event written through the repository can be queried yet
    async fn is_event_visible(&self, item_id: &str, event_id: Uuid) -> Result<bool, LedgerError>;
}

#[async_trait]
impl<T: MetadataRepository + ?Sized> MetadataRepository for Arc<T> {
    async fn get_properties(
        &self,
        item_id: &str,
    ) -> Result<BTreeMap<String, String>, LedgerError> {
        (**self).get_properties(item_id).await
    }

    async fn create_ingest_event(&self, event: &IngestEvent) -> Result<(), LedgerError> {
        (**self).create_ingest_event(event).await
    }
}

#[async_trait]
impl<T: ProvenanceLedger + ?Sized> ProvenanceLedger for Arc<T> {
    async fn candidates_after(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, LedgerError> {
        (**self).candidates_after(after, limit).await
    }

    async fn has_been_sent(&self, item_id: &str) -> Result<bool, LedgerError> {
        (**self).has_been_sent(item_id).await
    }

    async fn payload_bytes_submitted(&self) -> Result<u64, LedgerError> {
        (**self).payload_bytes_submitted().await
    }

    async fn is_event_visible(&self, item_id: &str, event_id: Uuid) -> Result<bool, LedgerError> {
        (**self).is_event_visible(item_id, event_id).await
    }
}
