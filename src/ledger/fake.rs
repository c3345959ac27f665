use crate::ledger::error::LedgerError;
use crate::ledger::models::{Candidate, IngestEvent};
use crate::ledger::repository::{MetadataRepository, ProvenanceLedger};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory repository + ledger with simulated propagation delay
#[derive(Clone, Default)]
pub struct FakeLedger {
    packages: Arc<Mutex<BTreeMap<String, Candidate>>>,
    properties: Arc<Mutex<HashMap<String, BTreeMap<String, String>>>>,
    events: Arc<Mutex<Vec<IngestEvent>>>,
    fail_properties: Arc<Mutex<HashSet<String>>>,
    visibility_lag: Arc<Mutex<u32>>,
    pending_checks: Arc<Mutex<HashMap<Uuid, u32>>>,
    extra_usage: Arc<Mutex<u64>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fake_add_package(&self, item_id: &str, sort_key: &str, title: Option<&str>) {
        let mut packages = self.packages.lock().unwrap();
        packages.insert(
            sort_key.to_string(),
            Candidate {
                item_id: item_id.to_string(),
                sort_key: sort_key.to_string(),
                title: title.map(str::to_string),
            },
        );
    }

    pub fn fake_set_property(&self, item_id: &str, key: &str, value: &str) {
        let mut properties = self.properties.lock().unwrap();
        properties
            .entry(item_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Make `get_properties` fail for this item
    pub fn fake_fail_properties(&self, item_id: &str) {
        self.fail_properties.lock().unwrap().insert(item_id.to_string());
    }

    /// Newly created events stay invisible for this many visibility checks
    pub fn fake_visibility_lag(&self, checks: u32) {
        *self.visibility_lag.lock().unwrap() = checks;
    }

    /// Usage already recorded by earlier runs
    pub fn fake_prior_usage(&self, bytes: u64) {
        *self.extra_usage.lock().unwrap() = bytes;
    }

    pub fn fake_events(&self) -> Vec<IngestEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataRepository for FakeLedger {
    async fn get_properties(
        &self,
        item_id: &str,
    ) -> Result<BTreeMap<String, String>, LedgerError> {
        if self.fail_properties.lock().unwrap().contains(item_id) {
            return Err(LedgerError::OperationError(format!(
                "Simulated failure for {}",
                item_id
            )));
        }

        let mut properties = self
            .properties
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .unwrap_or_default();

        let packages = self.packages.lock().unwrap();
        let package = packages.values().find(|c| c.item_id == item_id);
        match package {
            Some(candidate) => {
                if let Some(title) = &candidate.title {
                    properties
                        .entry("title".to_string())
                        .or_insert_with(|| title.clone());
                }
                Ok(properties)
            }
            None if !properties.is_empty() => Ok(properties),
            None => Err(LedgerError::NotFound(item_id.to_string())),
        }
    }

    async fn create_ingest_event(&self, event: &IngestEvent) -> Result<(), LedgerError> {
        let lag = *self.visibility_lag.lock().unwrap();
        self.pending_checks.lock().unwrap().insert(event.id, lag);
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl ProvenanceLedger for FakeLedger {
    async fn candidates_after(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Candidate>, LedgerError> {
        let packages = self.packages.lock().unwrap();
        Ok(packages
            .values()
            .filter(|c| after.map_or(true, |after| c.sort_key.as_str() > after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn has_been_sent(&self, item_id: &str) -> Result<bool, LedgerError> {
        let events = self.events.lock().unwrap();
        Ok(events.iter().any(|e| e.item_id == item_id))
    }

    async fn payload_bytes_submitted(&self) -> Result<u64, LedgerError> {
        let events = self.events.lock().unwrap();
        let recorded: u64 = events.iter().map(|e| e.payload_size).sum();
        Ok(recorded + *self.extra_usage.lock().unwrap())
    }

    async fn is_event_visible(&self, item_id: &str, event_id: Uuid) -> Result<bool, LedgerError> {
        let mut pending = self.pending_checks.lock().unwrap();
        if let Some(remaining) = pending.get_mut(&event_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        drop(pending);

        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .any(|e| e.id == event_id && e.item_id == item_id))
    }
}
