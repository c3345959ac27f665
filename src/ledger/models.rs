use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A preservation package that may be submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub item_id: String,
    /// Unique, stable ordering key used to page through candidates
    pub sort_key: String,
    pub title: Option<String>,
}

/// Provenance record of one accepted transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEvent {
    pub id: Uuid,
    pub item_id: String,
    pub bag_name: String,
    /// Size of the whole archive in bytes
    pub bag_size: u64,
    /// Payload bytes only, counted against the quota
    pub payload_size: u64,
    pub etag: Option<String>,
    pub manifest: String,
    pub event_date: DateTime<Utc>,
}

impl IngestEvent {
    pub fn new(
        item_id: &str,
        bag_name: &str,
        bag_size: u64,
        payload_size: u64,
        etag: Option<String>,
        manifest: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: item_id.to_string(),
            bag_name: bag_name.to_string(),
            bag_size,
            payload_size,
            etag,
            manifest: manifest.to_string(),
            event_date: Utc::now(),
        }
    }
}
