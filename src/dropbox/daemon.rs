use crate::config::DropboxConfig;
use crate::dropbox::watcher::{DropboxWatcher, WatcherSettings};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Shared scratch space for in-progress copies, inside the preservation root
pub const TEMP_DIR_NAME: &str = ".dropbox-tmp";

// Dropbox directories are named "<id>_<anything>"
static DROPBOX_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_").expect("dropbox directory regex is valid"));

/// Watchers started and stopped by one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub started: Vec<PathBuf>,
    pub stopped: Vec<PathBuf>,
}

/// Keeps one [`DropboxWatcher`] running for every `<id>_*` directory under the watch root.
pub struct DropboxDaemon {
    watch_root: PathBuf,
    pres_root: PathBuf,
    settings: WatcherSettings,
    refresh_interval: Duration,
    watchers: Mutex<HashMap<PathBuf, DropboxWatcher>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl DropboxDaemon {
    pub fn new(
        watch_root: impl Into<PathBuf>,
        pres_root: impl Into<PathBuf>,
        config: &DropboxConfig,
    ) -> Self {
        Self {
            watch_root: watch_root.into(),
            pres_root: pres_root.into(),
            settings: WatcherSettings::from_config(config),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            watchers: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.pres_root.join(TEMP_DIR_NAME)
    }

    /// Preservation directory for a dropbox directory name, if it matches `<id>_`
    pub fn destination_for(&self, dir_name: &str) -> Option<PathBuf> {
        DROPBOX_DIR_RE
            .captures(dir_name)
            .and_then(|caps| caps.get(1))
            .map(|id| self.pres_root.join(id.as_str()))
    }

    fn discover(&self) -> io::Result<BTreeSet<PathBuf>> {
        let mut found = BTreeSet::new();
        for entry in std::fs::read_dir(&self.watch_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if DROPBOX_DIR_RE.is_match(&name.to_string_lossy()) {
                found.insert(entry.path());
            }
        }
        Ok(found)
    }

    /// Reconcile running watchers with the directories currently present.
    ///
    /// New matching directories get a started watcher; watchers whose directory
    /// is gone are shut down and joined. Running it twice changes nothing.
    pub async fn refresh(&self) -> io::Result<RefreshSummary> {
        let present = self.discover()?;
        let mut summary = RefreshSummary::default();
        let mut watchers = self.watchers.lock().await;

        let gone: Vec<PathBuf> = watchers
            .keys()
            .filter(|dir| !present.contains(*dir))
            .cloned()
            .collect();
        for dir in gone {
            if let Some(watcher) = watchers.remove(&dir) {
                info!("Dropbox {} removed, stopping watcher", dir.display());
                watcher.shutdown().await;
                summary.stopped.push(dir);
            }
        }

        for dir in present {
            if watchers.contains_key(&dir) {
                continue;
            }
            let Some(destination) = dir
                .file_name()
                .and_then(|name| self.destination_for(&name.to_string_lossy()))
            else {
                continue;
            };

            if let Err(e) = std::fs::create_dir_all(&destination) {
                error!(
                    "Failed to create preservation directory {}: {}",
                    destination.display(),
                    e
                );
                continue;
            }

            let watcher = DropboxWatcher::new(&dir, destination, self.temp_dir(), self.settings);
            watcher.start();
            watchers.insert(dir.clone(), watcher);
            summary.started.push(dir);
        }

        Ok(summary)
    }

    pub async fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.watchers.lock().await.keys().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Run the reconciliation loop in the background until [`shutdown`](Self::shutdown)
    pub fn spawn(self: &Arc<Self>) {
        let daemon = Arc::clone(self);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let mut ticker = interval(daemon.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match daemon.refresh().await {
                            Ok(summary) if !summary.started.is_empty() || !summary.stopped.is_empty() => {
                                info!(
                                    "Dropbox refresh: {} started, {} stopped",
                                    summary.started.len(),
                                    summary.stopped.len()
                                );
                            }
                            Ok(_) => {}
                            Err(e) => warn!(
                                "Failed to scan watch root {}: {}",
                                daemon.watch_root.display(),
                                e
                            ),
                        }
                    }
                }
            }
        });
    }

    /// Stop the reconciliation loop, then every watcher
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let mut watchers = self.watchers.lock().await;
        for (_, watcher) in watchers.drain() {
            watcher.shutdown().await;
        }
        info!("Dropbox daemon stopped");
    }
}
