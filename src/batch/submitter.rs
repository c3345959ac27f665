use crate::batch::job::{JobError, JobOutcome, SubmissionJob};
use crate::bag::SerializedBag;
use crate::config::{BagConfig, BatchConfig};
use crate::ledger::{LedgerError, MetadataRepository, ProvenanceLedger, VisibilityPolicy};
use crate::payload::PayloadSource;
use crate::transfer::{ObjectStore, TransferClient};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tally of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub examined: usize,
    pub skipped: usize,
    pub transferred: Vec<String>,
    pub conflicts: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Payload bytes accepted during this run
    pub bytes_submitted: u64,
    /// Item that would have pushed usage over the quota, if the run stopped there
    pub quota_stopped_at: Option<String>,
}

/// Quota-aware loop over every candidate the ledger has not seen sent
pub struct BatchSubmitter<S: ObjectStore> {
    source: Arc<dyn PayloadSource>,
    transfer: TransferClient<S>,
    repository: Arc<dyn MetadataRepository>,
    ledger: Arc<dyn ProvenanceLedger>,
    bag_config: BagConfig,
    batch_config: BatchConfig,
    visibility: VisibilityPolicy,
}

impl<S: ObjectStore> BatchSubmitter<S> {
    pub fn new(
        source: Arc<dyn PayloadSource>,
        transfer: TransferClient<S>,
        repository: Arc<dyn MetadataRepository>,
        ledger: Arc<dyn ProvenanceLedger>,
        bag_config: BagConfig,
        batch_config: BatchConfig,
        visibility: VisibilityPolicy,
    ) -> Self {
        Self {
            source,
            transfer,
            repository,
            ledger,
            bag_config,
            batch_config,
            visibility,
        }
    }

    /// Run until the candidates are exhausted or the quota would be exceeded.
    ///
    /// Per-item failures are logged and recorded in the report; only ledger
    /// failures while paging end the run with an error.
    pub async fn run(&self) -> Result<BatchReport, LedgerError> {
        let mut report = BatchReport::default();
        let mut usage = self.ledger.payload_bytes_submitted().await?;
        let quota = self.batch_config.quota_bytes;
        let page_size = self.batch_config.page_size.max(1);
        info!(
            "Starting batch: {} payload bytes already submitted, quota {}",
            usage, quota
        );

        let mut after: Option<String> = None;
        loop {
            let page = self
                .ledger
                .candidates_after(after.as_deref(), page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            after = page.last().map(|c| c.sort_key.clone());
            debug!("Fetched page of {} candidates", page.len());

            for candidate in page {
                report.examined += 1;
                let item_id = candidate.item_id.clone();

                match self.ledger.has_been_sent(&item_id).await {
                    Ok(true) => {
                        debug!("Skipping {}: already sent", item_id);
                        report.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!("Failed to check whether {} was sent: {}", item_id, e);
                        report.failed.push((item_id, e.to_string()));
                        continue;
                    }
                }

                let job = SubmissionJob::new(candidate);
                let serialized = match job.assemble(&self.bag_config, self.source.clone()).await {
                    Ok(serialized) => serialized,
                    Err(e) => {
                        report.failed.push((item_id, e.to_string()));
                        continue;
                    }
                };

                if usage.saturating_add(serialized.payload_byte_size) > quota {
                    warn!(
                        "Submitting {} ({} payload bytes) would exceed the quota ({} of {} used), stopping",
                        item_id, serialized.payload_byte_size, usage, quota
                    );
                    remove_archive(&serialized).await;
                    report.quota_stopped_at = Some(item_id);
                    return Ok(report);
                }

                let outcome = job
                    .submit(
                        &serialized,
                        &self.transfer,
                        self.repository.as_ref(),
                        self.ledger.as_ref(),
                        self.visibility,
                        self.batch_config.overwrite,
                    )
                    .await;
                remove_archive(&serialized).await;

                match outcome {
                    Ok(JobOutcome::Transferred { payload_bytes, .. }) => {
                        usage += payload_bytes;
                        report.bytes_submitted += payload_bytes;
                        report.transferred.push(item_id);
                    }
                    Ok(JobOutcome::Conflict(_)) => report.conflicts.push(item_id),
                    Err(JobError::Unrecorded {
                        payload_bytes,
                        source,
                    }) => {
                        // The bytes are stored remotely and count against the quota regardless
                        usage += payload_bytes;
                        report.bytes_submitted += payload_bytes;
                        report.failed.push((item_id, source.to_string()));
                    }
                    Err(e) => report.failed.push((item_id, e.to_string())),
                }
            }
        }

        info!(
            "Batch finished: {} examined, {} transferred, {} skipped, {} conflicts, {} failed",
            report.examined,
            report.transferred.len(),
            report.skipped,
            report.conflicts.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

async fn remove_archive(serialized: &SerializedBag) {
    match tokio::fs::remove_file(&serialized.archive_path).await {
        Ok(()) => debug!("Deleted {}", serialized.archive_path.display()),
        Err(e) => warn!(
            "Failed to delete {}: {}",
            serialized.archive_path.display(),
            e
        ),
    }
}
