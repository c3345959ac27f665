pub mod checksum;
pub mod daemon;
pub mod error;
pub mod promote;
pub mod queue;
pub mod sidecar;
pub mod watcher;
#[cfg(test)]
mod tests;

pub use daemon::{DropboxDaemon, RefreshSummary};
pub use error::DropboxError;
pub use queue::PendingQueue;
pub use sidecar::DropboxEntry;
pub use watcher::{DropboxWatcher, MoveStats, WatcherSettings};
