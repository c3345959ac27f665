use crate::config::DropboxConfig;
use crate::dropbox::error::DropboxError;
use crate::dropbox::promote::promote;
use crate::dropbox::queue::PendingQueue;
use crate::dropbox::sidecar::DropboxEntry;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub const SUCCESS_MESSAGE: &str = "Successfully transferred to preservation storage.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    pub move_interval: Duration,
    /// A file must be left alone this long before it is moved
    pub grace_period: Duration,
}

impl WatcherSettings {
    pub fn from_config(config: &DropboxConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            move_interval: Duration::from_secs(config.move_interval_secs),
            grace_period: Duration::from_secs(config.grace_period_secs),
        }
    }
}

/// Counts from one mover pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveStats {
    pub promoted: usize,
    pub rejected: usize,
    pub retried: usize,
    pub dropped: usize,
}

struct WatcherCore {
    watch_dir: PathBuf,
    destination_dir: PathBuf,
    temp_dir: PathBuf,
    queue: PendingQueue,
    grace_period: Duration,
}

impl WatcherCore {
    fn collect(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
        for dir_entry in std::fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            let file_type = dir_entry.file_type()?;
            let path = dir_entry.path();
            if file_type.is_dir() {
                Self::collect(&path, files)?;
            } else if file_type.is_file() && !DropboxEntry::is_sidecar(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Where a staged file ends up, keeping its path relative to the dropbox
    fn destination_for(&self, file: &Path) -> PathBuf {
        match file.strip_prefix(&self.watch_dir) {
            Ok(relative) => self.destination_dir.join(relative),
            Err(_) => self
                .destination_dir
                .join(file.file_name().unwrap_or(file.as_os_str())),
        }
    }

    fn scan(&self) -> io::Result<usize> {
        let mut files = Vec::new();
        Self::collect(&self.watch_dir, &mut files)?;

        let mut added = 0;
        for file in files {
            let entry = DropboxEntry::new(&file);
            match entry.is_eligible() {
                Ok(true) => {
                    if self.queue.enqueue(file.clone()) {
                        debug!("Queued {}", file.display());
                        added += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to check {}: {}", file.display(), e),
            }
        }
        Ok(added)
    }
}

/// Watches one dropbox directory and moves verified files into preservation storage.
///
/// Two background tasks share a [`PendingQueue`]: a scanner that enqueues
/// eligible files every poll interval, and a mover that promotes files once
/// they have been left alone for the grace period.
pub struct DropboxWatcher {
    core: Arc<WatcherCore>,
    settings: WatcherSettings,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl DropboxWatcher {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            core: Arc::new(WatcherCore {
                watch_dir: watch_dir.into(),
                destination_dir: destination_dir.into(),
                temp_dir: temp_dir.into(),
                queue: PendingQueue::new(),
                grace_period: settings.grace_period,
            }),
            settings,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.core.queue
    }

    /// Spawn the scanner and mover tasks
    pub fn start(&self) {
        info!(
            "Watching {} -> {}",
            self.core.watch_dir.display(),
            self.core.destination_dir.display()
        );

        let core = Arc::clone(&self.core);
        let cancel = self.cancel.clone();
        let poll_interval = self.settings.poll_interval;
        self.tracker.spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Stopping directory watching [{}]", core.watch_dir.display());
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = scan_core(&core).await {
                            error!("Failed to scan {}: {}", core.watch_dir.display(), e);
                        }
                    }
                }
            }
        });

        let core = Arc::clone(&self.core);
        let cancel = self.cancel.clone();
        let move_interval = self.settings.move_interval;
        self.tracker.spawn(async move {
            debug!("File move process started");
            let mut ticker = interval(move_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Stopping file move processor [{}]", core.watch_dir.display());
                        break;
                    }
                    _ = ticker.tick() => {
                        move_core(&core).await;
                    }
                }
            }
        });
    }

    /// Run one scanner pass, returning how many files were newly queued
    pub async fn scan_once(&self) -> io::Result<usize> {
        scan_core(&self.core).await
    }

    /// Run one mover pass
    pub async fn move_once(&self) -> MoveStats {
        move_core(&self.core).await
    }

    /// Signal both tasks and wait for them to finish their current unit of work
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Watcher ended [{}]", self.core.watch_dir.display());
    }
}

async fn scan_core(core: &Arc<WatcherCore>) -> io::Result<usize> {
    let core = Arc::clone(core);
    task::spawn_blocking(move || core.scan())
        .await
        .map_err(|e| io::Error::other(format!("Task panic: {e}")))?
}

async fn move_core(core: &Arc<WatcherCore>) -> MoveStats {
    let mut stats = MoveStats::default();
    let ready = core.queue.take_ready(core.grace_period, SystemTime::now());

    for file in ready {
        info!("{} queued for move to preservation storage.", file.display());
        let worker = Arc::clone(core);
        let path = file.clone();
        let result = task::spawn_blocking(move || {
            let entry = DropboxEntry::new(&path);
            let destination = worker.destination_for(&path);
            let result = promote(&entry, &destination, &worker.temp_dir);
            (entry, result)
        })
        .await;

        let (entry, result) = match result {
            Ok(pair) => pair,
            Err(e) => {
                error!("Mover task for {} panicked: {}", file.display(), e);
                core.queue.requeue(file);
                stats.retried += 1;
                continue;
            }
        };

        settle(&core.queue, file, &entry, result, &mut stats);
    }

    stats
}

/// Log the outcome of one promotion and decide whether the file comes back
pub(crate) fn settle(
    queue: &PendingQueue,
    file: PathBuf,
    entry: &DropboxEntry,
    result: Result<PathBuf, DropboxError>,
    stats: &mut MoveStats,
) {
    match result {
        Ok(destination) => {
            info!("{} promoted to {}", file.display(), destination.display());
            write_log(entry, SUCCESS_MESSAGE);
            queue.finish(&file);
            stats.promoted += 1;
        }
        Err(e) if e.is_terminal() => {
            warn!("Rejected {}: {}", file.display(), e);
            write_log(entry, &e.to_string());
            queue.finish(&file);
            stats.rejected += 1;
        }
        Err(DropboxError::Vanished(_)) | Err(DropboxError::MissingChecksum(_)) => {
            debug!("{} is no longer eligible", file.display());
            queue.finish(&file);
            stats.dropped += 1;
        }
        Err(e) => {
            if matches!(e, DropboxError::Io(_)) {
                error!("IO error while copying {}: {}", file.display(), e);
            } else {
                info!("Will retry {}: {}", file.display(), e);
            }
            queue.requeue(file);
            stats.retried += 1;
        }
    }
}

fn write_log(entry: &DropboxEntry, message: &str) {
    if let Err(e) = entry.append_log(message) {
        error!("IO error while writing log file {}: {}", entry.log_path().display(), e);
    }
}
