use crate::bag::{Access, AptrustInfo, Bag, BagError, BagInfo, SerializedBag};
use crate::config::BagConfig;
use crate::ledger::{
    wait_for_event, Candidate, IngestEvent, LedgerError, MetadataRepository, ProvenanceLedger,
    VisibilityPolicy,
};
use crate::payload::PayloadSource;
use crate::transfer::{ObjectStore, TransferClient, TransferOutcome};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to assemble bag: {0}")]
    Bag(#[from] BagError),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The archive reached remote storage but its ingestion event could not be written
    #[error("Transferred but not recorded: {source}")]
    Unrecorded {
        payload_bytes: u64,
        #[source]
        source: LedgerError,
    },

    #[error("Invalid bag settings: {0}")]
    InvalidConfig(String),
}

/// What happened to a prepared bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Transferred {
        etag: String,
        payload_bytes: u64,
        /// Whether the ingestion event became queryable before the wait gave up
        visible: bool,
    },
    /// The package already exists remotely; nothing was recorded
    Conflict(String),
}

/// Submission of one preservation package: assemble, transfer, record
pub struct SubmissionJob {
    pub id: String,
    pub candidate: Candidate,
}

impl SubmissionJob {
    pub fn new(candidate: Candidate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            candidate,
        }
    }

    /// The bag for this candidate, described by the configured tags
    pub fn bag<P: PayloadSource>(&self, config: &BagConfig, source: P) -> Result<Bag<P>, JobError> {
        build_bag(
            &self.candidate.item_id,
            self.candidate.title.as_deref(),
            config,
            source,
        )
    }

    pub async fn assemble<P: PayloadSource>(
        &self,
        config: &BagConfig,
        source: P,
    ) -> Result<SerializedBag, JobError> {
        debug!(
            "[Job {}] Assembling bag for {}",
            self.id, self.candidate.item_id
        );
        let bag = self.bag(config, source)?;
        let serialized = bag.serialize(&config.output_dir, true).await.map_err(|e| {
            error!(
                "[Job {}] Failed to assemble {}: {}",
                self.id, self.candidate.item_id, e
            );
            JobError::Bag(e)
        })?;
        Ok(serialized)
    }

    /// Transfer a serialized bag and record the ingestion event when it is accepted
    pub async fn submit<S, R, L>(
        &self,
        serialized: &SerializedBag,
        transfer: &TransferClient<S>,
        repository: &R,
        ledger: &L,
        visibility: VisibilityPolicy,
        overwrite: bool,
    ) -> Result<JobOutcome, JobError>
    where
        S: ObjectStore,
        R: MetadataRepository + ?Sized,
        L: ProvenanceLedger + ?Sized,
    {
        let item_id = self.candidate.item_id.as_str();
        let summary = transfer.transfer_bag(serialized, overwrite).await;

        let etag = match (summary.outcome, summary.remote_etag) {
            (TransferOutcome::Accepted, Some(etag)) => etag,
            (TransferOutcome::Conflict, _) => {
                let message = summary.message.unwrap_or_default();
                warn!("[Job {}] Not transferred: {}", self.id, message);
                return Ok(JobOutcome::Conflict(message));
            }
            _ => {
                let message = summary
                    .message
                    .unwrap_or_else(|| "no etag returned".to_string());
                error!("[Job {}] Transfer of {} failed: {}", self.id, item_id, message);
                return Err(JobError::Transfer(message));
            }
        };

        let event = IngestEvent::new(
            item_id,
            &serialized.bag_name,
            serialized.archive_len,
            serialized.payload_byte_size,
            Some(etag.clone()),
            &serialized.manifest_text,
        );
        repository
            .create_ingest_event(&event)
            .await
            .map_err(|source| {
                error!(
                    "[Job {}] Failed to record ingestion of {}: {}",
                    self.id, item_id, source
                );
                JobError::Unrecorded {
                    payload_bytes: serialized.payload_byte_size,
                    source,
                }
            })?;

        let visible = match wait_for_event(ledger, item_id, event.id, visibility).await {
            Ok(attempts) => {
                debug!(
                    "[Job {}] Event {} visible after {} checks",
                    self.id, event.id, attempts
                );
                true
            }
            Err(e) => {
                warn!(
                    "[Job {}] Event {} for {} not yet visible: {}",
                    self.id, event.id, item_id, e
                );
                false
            }
        };

        info!(
            "[Job {}] Successfully submitted {} -> {} ({} payload bytes)",
            self.id, item_id, etag, serialized.payload_byte_size
        );
        Ok(JobOutcome::Transferred {
            etag,
            payload_bytes: serialized.payload_byte_size,
            visible,
        })
    }
}

/// Describe an item as a bag using the configured institution and tags
pub fn build_bag<P: PayloadSource>(
    item_id: &str,
    title: Option<&str>,
    config: &BagConfig,
    source: P,
) -> Result<Bag<P>, JobError> {
    let access: Access = config.access.parse().map_err(JobError::InvalidConfig)?;
    let title = title.filter(|t| !t.trim().is_empty()).unwrap_or(item_id);

    Ok(Bag::new(
        item_id,
        &config.institution_id,
        BagInfo::new(&config.source_organization, item_id),
        AptrustInfo::new(title, access),
        source,
        &config.working_dir,
    ))
}
