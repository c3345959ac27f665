use crate::config::LedgerConfig;
use crate::ledger::error::LedgerError;
use crate::ledger::repository::ProvenanceLedger;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Fixed-interval polling, optionally bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityPolicy {
    pub poll_interval: Duration,
    /// `None` polls forever
    pub timeout: Option<Duration>,
}

impl VisibilityPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.visibility_poll_ms),
            timeout: config.visibility_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Poll `check` until it reports true, sleeping `poll_interval` between attempts.
///
/// Returns the number of checks made.
pub async fn wait_until_visible<F, Fut>(
    what: &str,
    mut check: F,
    policy: VisibilityPolicy,
) -> Result<u32, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, LedgerError>>,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        if check().await? {
            return Ok(attempts);
        }

        if let Some(timeout) = policy.timeout {
            if started.elapsed() >= timeout {
                return Err(LedgerError::VisibilityTimeout {
                    what: what.to_string(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
        }

        debug!("Waiting for {} to propagate to the ledger...", what);
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Wait until an ingestion event is queryable in the ledger
pub async fn wait_for_event<L: ProvenanceLedger + ?Sized>(
    ledger: &L,
    item_id: &str,
    event_id: Uuid,
    policy: VisibilityPolicy,
) -> Result<u32, LedgerError> {
    let what = format!("event {} of {}", event_id, item_id);
    wait_until_visible(&what, move || ledger.is_event_visible(item_id, event_id), policy).await
}
