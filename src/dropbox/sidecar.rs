use crate::dropbox::checksum::parse_sidecar;
use crate::dropbox::error::DropboxError;
use chrono::Local;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const CHECKSUM_SUFFIX: &str = ".md5";
pub const LOG_SUFFIX: &str = ".log";

/// A staged file in a dropbox together with its `.md5` and `.log` sidecars
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DropboxEntry {
    file: PathBuf,
}

impl DropboxEntry {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn checksum_path(&self) -> PathBuf {
        with_suffix(&self.file, CHECKSUM_SUFFIX)
    }

    pub fn log_path(&self) -> PathBuf {
        with_suffix(&self.file, LOG_SUFFIX)
    }

    /// Sidecars are never promoted themselves
    pub fn is_sidecar(path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.ends_with(CHECKSUM_SUFFIX) || name.ends_with(LOG_SUFFIX)
            })
            .unwrap_or(false)
    }

    /// A file is eligible once its checksum exists and no log written after
    /// both the file and the checksum already records an outcome for it.
    pub fn is_eligible(&self) -> io::Result<bool> {
        let Some(checksum_mtime) = modified(&self.checksum_path())? else {
            return Ok(false);
        };
        let Some(file_mtime) = modified(&self.file)? else {
            return Ok(false);
        };

        match modified(&self.log_path())? {
            Some(log_mtime) => Ok(!(log_mtime > file_mtime && log_mtime > checksum_mtime)),
            None => Ok(true),
        }
    }

    pub fn expected_checksum(&self) -> Result<String, DropboxError> {
        match fs::read_to_string(self.checksum_path()) {
            Ok(text) => Ok(parse_sidecar(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DropboxError::MissingChecksum(self.file.clone()))
            }
            Err(e) => Err(DropboxError::Io(e)),
        }
    }

    /// Append a timestamped outcome line to `<file>.log`
    pub fn append_log(&self, message: &str) -> io::Result<()> {
        let line = format!("{} {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        log.write_all(line.as_bytes())?;
        log.flush()
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Modification time, or `None` if the file does not exist
pub(crate) fn modified(path: &Path) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.modified()?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
