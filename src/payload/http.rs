use crate::ledger::{LedgerError, MetadataRepository};
use crate::payload::error::PayloadError;
use crate::payload::source::{validate_logical_path, PayloadEntry, PayloadSource};
use crate::payload::staging::StagingArea;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Item properties with this prefix name a payload file; the value is its URL
pub const PAYLOAD_PROPERTY_PREFIX: &str = "payload:";

/// Payload downloaded over HTTP into the bag's staging area.
///
/// The files of an item are discovered from its metadata: every property
/// `payload:<logical path>` holds the URL to fetch for that path.
pub struct HttpPayloadSource {
    client: reqwest::Client,
    repository: Arc<dyn MetadataRepository>,
}

impl HttpPayloadSource {
    pub fn new(client: reqwest::Client, repository: Arc<dyn MetadataRepository>) -> Self {
        Self { client, repository }
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<(), PayloadError> {
        let fetch_error = |reason: String| PayloadError::Fetch {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP status {}", status)));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(())
    }
}

#[async_trait]
impl PayloadSource for HttpPayloadSource {
    async fn list_payload_entries(
        &self,
        item_id: &str,
        staging: &StagingArea,
    ) -> Result<Vec<PayloadEntry>, PayloadError> {
        let properties = self
            .repository
            .get_properties(item_id)
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(key) => PayloadError::NotFound(key),
                e => PayloadError::Metadata(e.to_string()),
            })?;

        let links: Vec<(String, String)> = properties
            .into_iter()
            .filter_map(|(key, url)| {
                key.strip_prefix(PAYLOAD_PROPERTY_PREFIX)
                    .map(|logical| (logical.to_string(), url))
            })
            .collect();

        if links.is_empty() {
            return Err(PayloadError::NotFound(item_id.to_string()));
        }

        info!("Downloading {} payload files for {}", links.len(), item_id);
        let mut entries = Vec::with_capacity(links.len());
        for (logical_path, url) in links {
            validate_logical_path(&logical_path)?;
            let destination = staging.allocate(&logical_path)?;
            self.download(&url, &destination).await?;
            entries.push(PayloadEntry::new(logical_path, destination));
        }

        Ok(entries)
    }
}
