use crate::dropbox::checksum::copy_and_hash;
use crate::dropbox::error::DropboxError;
use crate::dropbox::sidecar::{modified, DropboxEntry};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Removes the temporary copy unless it was handed over to the destination
struct TempCopy {
    path: PathBuf,
    armed: bool,
}

impl TempCopy {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to delete temporary copy {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

/// Filesystem steps of a promotion that can be substituted
pub(crate) trait PromoteSteps {
    fn copy(&self, source: &Path, target: &Path) -> io::Result<String> {
        copy_and_hash(source, target)
    }

    fn remove_original(&self, file: &Path) -> io::Result<()> {
        fs::remove_file(file)
    }
}

struct FsSteps;

impl PromoteSteps for FsSteps {}

/// Verify a staged file against its checksum and move it into `destination`.
///
/// The bytes are copied into `temp_dir`, which must be on the same filesystem as
/// `destination`, hashing as they go. Only a verified copy of an unmodified file
/// is linked into place, after which the staged file is deleted. On any failure
/// the staged file is left untouched and the temporary copy removed.
///
/// Once the copy is in place the promotion has succeeded; failing to delete
/// the staged file afterwards is only logged.
pub fn promote(
    entry: &DropboxEntry,
    destination: &Path,
    temp_dir: &Path,
) -> Result<PathBuf, DropboxError> {
    promote_with(&FsSteps, entry, destination, temp_dir)
}

pub(crate) fn promote_with<S: PromoteSteps>(
    steps: &S,
    entry: &DropboxEntry,
    destination: &Path,
    temp_dir: &Path,
) -> Result<PathBuf, DropboxError> {
    let file = entry.file();
    let expected = entry.expected_checksum()?;
    let mtime_before =
        modified(file)?.ok_or_else(|| DropboxError::Vanished(file.to_path_buf()))?;

    if destination.exists() {
        return Err(DropboxError::AlreadyExists(destination.to_path_buf()));
    }

    fs::create_dir_all(temp_dir)?;
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut temp = TempCopy::new(temp_dir.join(format!("{}.{}.partial", file_name, Uuid::new_v4())));

    let actual = match steps.copy(file, &temp.path) {
        Ok(actual) => actual,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !file.exists() => {
            return Err(DropboxError::Vanished(file.to_path_buf()));
        }
        Err(e) => return Err(DropboxError::Io(e)),
    };
    info!("{} copied to {}", file.display(), temp.path.display());

    if !actual.eq_ignore_ascii_case(&expected) {
        info!("{} had a checksum mismatch: transaction cancelled.", file.display());
        return Err(DropboxError::ChecksumMismatch {
            file: file_name,
            expected,
            actual,
        });
    }

    if modified(file)? != Some(mtime_before) {
        info!("{} modified, transaction cancelled.", file.display());
        return Err(DropboxError::ModifiedDuringCopy(file.to_path_buf()));
    }

    // A hard link never replaces an existing file
    match fs::hard_link(&temp.path, destination) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(DropboxError::AlreadyExists(destination.to_path_buf()));
        }
        Err(e) => {
            debug!("Hard link into {} failed ({}), renaming", destination.display(), e);
            if destination.exists() {
                return Err(DropboxError::AlreadyExists(destination.to_path_buf()));
            }
            fs::rename(&temp.path, destination)?;
            temp.disarm();
        }
    }
    drop(temp);

    match steps.remove_original(file) {
        Ok(()) => info!("{} deleted from dropbox.", file.display()),
        Err(e) => warn!(
            "{} promoted to {} but could not be deleted from dropbox: {}",
            file.display(),
            destination.display(),
            e
        ),
    }

    Ok(destination.to_path_buf())
}
