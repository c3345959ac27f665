use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Scratch directory owning every temporary file created while building one bag.
///
/// Files are registered as they are allocated and deleted by [`release`], which
/// also runs on drop, so they disappear on success, on error and when the
/// serializing future is cancelled.
///
/// [`release`]: StagingArea::release
pub struct StagingArea {
    dir: PathBuf,
    files: Mutex<Vec<PathBuf>>,
}

impl StagingArea {
    /// Create a fresh, uniquely named staging directory under `parent`
    pub fn create(parent: &Path, label: &str) -> io::Result<Self> {
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let dir = parent.join(format!("{}-{}", label, Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        debug!("Created staging area {}", dir.display());

        Ok(Self {
            dir,
            files: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a path for `relative` inside the staging directory and register it
    pub fn allocate(&self, relative: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.register(path.clone());
        Ok(path)
    }

    /// Take ownership of a file created elsewhere
    pub fn register(&self, path: PathBuf) {
        self.lock_files().push(path);
    }

    /// Move a registered file out of the staging area; it will no longer be deleted.
    ///
    /// An existing `destination` is never replaced: the call fails with
    /// [`io::ErrorKind::AlreadyExists`] and the staged file stays registered.
    pub fn persist(&self, path: &Path, destination: &Path) -> io::Result<()> {
        match std::fs::hard_link(path, destination) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
            Err(e) => {
                // Working and output directories may sit on different filesystems
                debug!("Linking into {} failed ({}), copying", destination.display(), e);
                copy_new(path, destination)?;
            }
        }

        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to delete staged copy {}: {}", path.display(), e);
            return Ok(());
        }
        self.lock_files().retain(|p| p != path);
        Ok(())
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.lock_files().clone()
    }

    /// Delete every registered file and the staging directory, returning how many files went
    pub fn release(&self) -> usize {
        let files = std::mem::take(&mut *self.lock_files());
        let mut removed = 0;

        for file in files {
            match std::fs::remove_file(&file) {
                Ok(()) => {
                    debug!("Deleted {}", file.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete temporary file {}: {}", file.display(), e),
            }
        }

        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                warn!(
                    "Failed to remove staging directory {}: {}",
                    self.dir.display(),
                    e
                );
            }
        }

        removed
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Copy into a file that must not exist yet, removing it again if the copy fails
fn copy_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = File::open(source)?;
    let mut writer = File::options()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    if let Err(e) = copied {
        drop(writer);
        let _ = std::fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.release();
    }
}
