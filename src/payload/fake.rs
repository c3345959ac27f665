use crate::payload::error::PayloadError;
use crate::payload::source::{PayloadEntry, PayloadSource};
use crate::payload::staging::StagingArea;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory payload source that stages its bytes like a downloading source would
#[derive(Clone, Default)]
pub struct FakePayloadSource {
    items: Arc<Mutex<HashMap<String, Vec<(String, Vec<u8>)>>>>,
    fail_after: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakePayloadSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fake_add_file(&self, item_id: &str, logical_path: &str, data: &[u8]) {
        let mut items = self.items.lock().unwrap();
        items
            .entry(item_id.to_string())
            .or_default()
            .push((logical_path.to_string(), data.to_vec()));
    }

    /// Stage `count` files of the item, then fail as if the next download broke
    pub fn fake_fail_after(&self, item_id: &str, count: usize) {
        let mut fail_after = self.fail_after.lock().unwrap();
        fail_after.insert(item_id.to_string(), count);
    }
}

#[async_trait]
impl PayloadSource for FakePayloadSource {
    async fn list_payload_entries(
        &self,
        item_id: &str,
        staging: &StagingArea,
    ) -> Result<Vec<PayloadEntry>, PayloadError> {
        let files = self
            .items
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .ok_or_else(|| PayloadError::NotFound(item_id.to_string()))?;
        let fail_after = self.fail_after.lock().unwrap().get(item_id).copied();

        let mut entries = Vec::new();
        for (index, (logical_path, data)) in files.into_iter().enumerate() {
            if fail_after == Some(index) {
                return Err(PayloadError::Fetch {
                    url: format!("fake://{}/{}", item_id, logical_path),
                    reason: "simulated failure".to_string(),
                });
            }
            let path = staging.allocate(&format!("{}-{}", index, logical_path.replace('/', "_")))?;
            std::fs::write(&path, data)?;
            entries.push(PayloadEntry::new(logical_path, path));
        }

        Ok(entries)
    }
}
