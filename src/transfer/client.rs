use crate::bag::SerializedBag;
use crate::transfer::error::StoreError;
use crate::transfer::store::ObjectStore;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The store accepted the archive
    Accepted,
    /// An object with the bag's name already exists and overwrite was not requested
    Conflict,
    /// The upload did not complete; the cause is in the summary message
    Failed,
}

/// Receipt of one transfer attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub transferred: bool,
    /// Present iff `transferred`
    pub remote_etag: Option<String>,
    pub duration_ms: u64,
    /// Cause when not transferred
    pub message: Option<String>,
    pub outcome: TransferOutcome,
}

impl TransferSummary {
    fn accepted(etag: String, started: Instant) -> Self {
        Self {
            transferred: true,
            remote_etag: Some(etag),
            duration_ms: started.elapsed().as_millis() as u64,
            message: None,
            outcome: TransferOutcome::Accepted,
        }
    }

    fn rejected(outcome: TransferOutcome, message: String, started: Instant) -> Self {
        Self {
            transferred: false,
            remote_etag: None,
            duration_ms: started.elapsed().as_millis() as u64,
            message: Some(message),
            outcome,
        }
    }
}

/// Uploads serialized bags under their package name.
///
/// Transport failures are reported in the summary and never retried here;
/// callers can confirm a doubtful upload later with [`TransferClient::find_etag`].
pub struct TransferClient<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> TransferClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn transfer_bag(&self, bag: &SerializedBag, overwrite: bool) -> TransferSummary {
        let started = Instant::now();
        let key = bag.bag_name.as_str();

        if !overwrite {
            match self.store.head_object(key).await {
                Ok(Some(existing)) => {
                    warn!(
                        "{} already exists in remote storage (etag {}), not overwriting",
                        key, existing.etag
                    );
                    return TransferSummary::rejected(
                        TransferOutcome::Conflict,
                        format!(
                            "{} already exists in remote storage with etag {}",
                            key, existing.etag
                        ),
                        started,
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to check for existing {}: {}", key, e);
                    return TransferSummary::rejected(
                        TransferOutcome::Failed,
                        e.to_string(),
                        started,
                    );
                }
            }
        }

        let result = self
            .store
            .put_object(key, &bag.archive_path, &bag.archive_md5_base64, overwrite)
            .await;

        match result {
            Ok(etag) => {
                // Multipart uploads carry a composite etag, so a mismatch is only informative
                if !etag.eq_ignore_ascii_case(&bag.archive_md5_hex) {
                    warn!(
                        "Etag {} of {} differs from the archive MD5 {}",
                        etag, key, bag.archive_md5_hex
                    );
                }
                let summary = TransferSummary::accepted(etag, started);
                info!(
                    "Transferred {} ({} bytes) in {} ms",
                    key, bag.archive_len, summary.duration_ms
                );
                summary
            }
            Err(StoreError::Conflict(_)) => {
                warn!("{} was created remotely by another submitter", key);
                TransferSummary::rejected(
                    TransferOutcome::Conflict,
                    format!("{} already exists in remote storage", key),
                    started,
                )
            }
            Err(e) => {
                error!("Failed to transfer {}: {}", key, e);
                TransferSummary::rejected(TransferOutcome::Failed, e.to_string(), started)
            }
        }
    }

    /// Etag of the object stored under a package name, if any
    pub async fn find_etag(&self, bag_name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .head_object(bag_name)
            .await?
            .map(|object| object.etag))
    }
}
