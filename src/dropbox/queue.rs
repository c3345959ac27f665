use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<PathBuf>,
    queued: HashSet<PathBuf>,
    in_flight: HashSet<PathBuf>,
}

/// Files waiting to be moved, shared by the scanner and the mover.
///
/// A path is either pending, in flight or absent; it is never handed out twice.
#[derive(Debug, Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file unless it is already pending or being moved
    pub fn enqueue(&self, path: PathBuf) -> bool {
        let mut state = self.lock();
        if state.queued.contains(&path) || state.in_flight.contains(&path) {
            return false;
        }
        state.queued.insert(path.clone());
        state.pending.push_back(path);
        true
    }

    /// Claim every pending file left alone for at least `grace`.
    ///
    /// Modification times are checked while the lock is held, so a file is
    /// never claimed on a stale reading. Files that no longer exist are dropped.
    pub fn take_ready(&self, grace: Duration, now: SystemTime) -> Vec<PathBuf> {
        let mut state = self.lock();
        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(state.pending.len());

        while let Some(path) = state.pending.pop_front() {
            let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => mtime,
                Err(_) => {
                    debug!("{} vanished from the queue", path.display());
                    state.queued.remove(&path);
                    continue;
                }
            };

            let quiet_for = now.duration_since(mtime).unwrap_or(Duration::ZERO);
            if quiet_for >= grace {
                state.queued.remove(&path);
                state.in_flight.insert(path.clone());
                ready.push(path);
            } else {
                debug!(
                    "{} was modified {:?} ago, waiting in case more changes occur",
                    path.display(),
                    quiet_for
                );
                waiting.push_back(path);
            }
        }

        state.pending = waiting;
        ready
    }

    /// The mover is done with a file
    pub fn finish(&self, path: &Path) {
        self.lock().in_flight.remove(path);
    }

    /// Put a claimed file back for another attempt
    pub fn requeue(&self, path: PathBuf) {
        let mut state = self.lock();
        state.in_flight.remove(&path);
        if state.queued.insert(path.clone()) {
            state.pending.push_back(path);
        }
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.lock().pending.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
