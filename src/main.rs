// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

mod bag;
mod batch;
mod config;
mod dropbox;
mod ledger;
mod logging;
mod payload;
#[cfg(test)]
mod test_utils;
mod transfer;

use crate::batch::{build_bag, BatchSubmitter, JobOutcome, SubmissionJob};
use crate::config::{Config, PayloadSourceConfig};
use crate::dropbox::DropboxDaemon;
use crate::ledger::{
    Candidate, MetadataRepository, ProvenanceLedger, SqliteLedger, VisibilityPolicy,
};
use crate::payload::{HttpPayloadSource, LocalDumpSource, PayloadSource};
use crate::transfer::{S3ObjectStore, TransferClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.toml",
        global = true
    )]
    config: String,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a bag from a local dump directory
    Bag {
        /// Directory holding one subdirectory of payload files per item
        dump_dir: PathBuf,

        /// Item to bag
        item_id: String,

        /// Title written to aptrust-info.txt
        #[arg(long)]
        title: Option<String>,

        /// Transfer the bag and record the ingestion event
        #[arg(long)]
        transfer: bool,
    },
    /// Submit every unsent package until the quota would be exceeded
    Batch,
    /// Register a package as a submission candidate
    Register {
        item_id: String,

        /// Key that orders candidates during a batch
        sort_key: String,

        #[arg(long)]
        title: Option<String>,
    },
    /// Compare the remote etag of a package with the recorded ingestion events
    Confirm { item_id: String },
    /// Watch numbered dropbox directories and promote verified files
    Dropbox {
        /// Directory containing the `<id>_*` dropboxes
        watch_root: PathBuf,

        /// Preservation storage root
        pres_root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    let _log_guard = logging::init_logging(config.logging.as_ref(), cli.verbose)
        .context("Failed to initialize logging")?;

    info!("APTrust bagger v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config);

    let result = match cli.command {
        Commands::Bag {
            dump_dir,
            item_id,
            title,
            transfer,
        } => run_bag(config, dump_dir, item_id, title, transfer).await,
        Commands::Batch => run_batch(config).await,
        Commands::Register {
            item_id,
            sort_key,
            title,
        } => run_register(config, item_id, sort_key, title).await,
        Commands::Confirm { item_id } => run_confirm(config, item_id).await,
        Commands::Dropbox {
            watch_root,
            pres_root,
        } => run_dropbox(config, watch_root, pres_root).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}

fn open_ledger(config: &Config) -> Result<Arc<SqliteLedger>> {
    let ledger = SqliteLedger::new(&config.ledger.db_path)
        .with_context(|| format!("Failed to open ledger at {}", config.ledger.db_path))?;
    Ok(Arc::new(ledger))
}

async fn open_transfer(config: &Config) -> Result<TransferClient<S3ObjectStore>> {
    let s3_config = config
        .s3
        .as_ref()
        .context("An [s3] section is required to transfer bags")?;
    let store = S3ObjectStore::new(s3_config)
        .await
        .context("Failed to create S3 client")?;
    Ok(TransferClient::new(store))
}

async fn run_bag(
    config: Config,
    dump_dir: PathBuf,
    item_id: String,
    title: Option<String>,
    transfer: bool,
) -> Result<()> {
    let source = LocalDumpSource::new(dump_dir);

    if !transfer {
        let bag = build_bag(&item_id, title.as_deref(), &config.bag, source)?;
        let serialized = bag
            .serialize(&config.bag.output_dir, false)
            .await
            .with_context(|| format!("Failed to bag {}", item_id))?;
        info!(
            "Wrote {} ({} bytes, md5 {}, {} payload files)",
            serialized.archive_path.display(),
            serialized.archive_len,
            serialized.archive_md5_hex,
            serialized.payload_file_count
        );
        return Ok(());
    }

    let ledger = open_ledger(&config)?;
    let client = open_transfer(&config).await?;
    let job = SubmissionJob::new(Candidate {
        item_id: item_id.clone(),
        sort_key: item_id.clone(),
        title,
    });
    let serialized = job.assemble(&config.bag, source).await?;
    let outcome = job
        .submit(
            &serialized,
            &client,
            ledger.as_ref(),
            ledger.as_ref(),
            VisibilityPolicy::from_config(&config.ledger),
            config.batch.overwrite,
        )
        .await?;

    match outcome {
        JobOutcome::Transferred { etag, visible, .. } => {
            info!("{} transferred with etag {}", serialized.bag_name, etag);
            if !visible {
                warn!("The ingestion event is not yet visible in the ledger");
            }
        }
        JobOutcome::Conflict(message) => warn!("{} not transferred: {}", serialized.bag_name, message),
    }
    Ok(())
}

async fn run_batch(config: Config) -> Result<()> {
    let ledger = open_ledger(&config)?;
    let client = open_transfer(&config).await?;

    let source: Arc<dyn PayloadSource> = match &config.bag.source {
        PayloadSourceConfig::Local { dump_root } => Arc::new(LocalDumpSource::new(dump_root)),
        PayloadSourceConfig::Http => Arc::new(HttpPayloadSource::new(
            reqwest::Client::new(),
            ledger.clone() as Arc<dyn MetadataRepository>,
        )),
    };

    let submitter = BatchSubmitter::new(
        source,
        client,
        ledger.clone() as Arc<dyn MetadataRepository>,
        ledger as Arc<dyn ProvenanceLedger>,
        config.bag.clone(),
        config.batch.clone(),
        VisibilityPolicy::from_config(&config.ledger),
    );

    let report = submitter.run().await.context("Batch aborted")?;

    info!(
        "Batch finished: {} examined, {} skipped, {} transferred, {} conflicts, {} failed, {} payload bytes",
        report.examined,
        report.skipped,
        report.transferred.len(),
        report.conflicts.len(),
        report.failed.len(),
        report.bytes_submitted
    );
    for (item_id, reason) in &report.failed {
        warn!("{} failed: {}", item_id, reason);
    }
    if let Some(item_id) = &report.quota_stopped_at {
        warn!("Stopped at {}: quota of {} bytes reached", item_id, config.batch.quota_bytes);
    }
    Ok(())
}

async fn run_register(
    config: Config,
    item_id: String,
    sort_key: String,
    title: Option<String>,
) -> Result<()> {
    let ledger = open_ledger(&config)?;
    ledger
        .register_package(&item_id, &sort_key, title.as_deref())
        .await
        .with_context(|| format!("Failed to register {}", item_id))?;
    info!("Registered {} with sort key {}", item_id, sort_key);
    Ok(())
}

async fn run_confirm(config: Config, item_id: String) -> Result<()> {
    let ledger = open_ledger(&config)?;
    let client = open_transfer(&config).await?;
    let bag_name = format!("{}.{}.tar", config.bag.institution_id, item_id);

    let remote = client
        .find_etag(&bag_name)
        .await
        .with_context(|| format!("Failed to look up {}", bag_name))?;
    let events = ledger.ingest_events(&item_id).await?;
    let recorded = events.last().and_then(|e| e.etag.clone());

    match (remote, recorded) {
        (None, _) => warn!("{} is not in remote storage", bag_name),
        (Some(remote), Some(recorded)) if remote == recorded => {
            info!("{} confirmed with etag {}", bag_name, remote)
        }
        (Some(remote), Some(recorded)) => warn!(
            "{} has etag {} but the ledger recorded {}",
            bag_name, remote, recorded
        ),
        (Some(remote), None) => warn!(
            "{} is in remote storage with etag {} but no ingestion event is recorded",
            bag_name, remote
        ),
    }
    Ok(())
}

async fn run_dropbox(config: Config, watch_root: PathBuf, pres_root: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&pres_root)
        .with_context(|| format!("Failed to create {}", pres_root.display()))?;

    let daemon = Arc::new(DropboxDaemon::new(&watch_root, &pres_root, &config.dropbox));
    daemon
        .refresh()
        .await
        .with_context(|| format!("Failed to read watch root {}", watch_root.display()))?;
    daemon.spawn();

    info!("Watching {} for dropboxes, press Ctrl-C to stop", watch_root.display());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down dropbox watchers");
    daemon.shutdown().await;
    Ok(())
}
