use crate::config::DropboxConfig;
use crate::dropbox::checksum::{copy_and_hash, parse_sidecar};
use crate::dropbox::daemon::TEMP_DIR_NAME;
use crate::dropbox::promote::{promote, promote_with, PromoteSteps};
use crate::dropbox::watcher::{settle, SUCCESS_MESSAGE};
use crate::dropbox::{
    DropboxDaemon, DropboxEntry, DropboxError, DropboxWatcher, MoveStats, PendingQueue,
    RefreshSummary, WatcherSettings,
};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const CONTENT: &[u8] = b"preserve me";
const WRONG_MD5: &str = "b0e5e8b3e6f9b3c86a6b1e1b1f0a3b0d";

fn md5_hex(bytes: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(bytes))
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Copies normally, then touches the staged file the way a still-running upload would
struct TouchedDuringCopy;

impl PromoteSteps for TouchedDuringCopy {
    fn copy(&self, source: &Path, target: &Path) -> io::Result<String> {
        let digest = copy_and_hash(source, target)?;
        set_mtime(source, SystemTime::now() + Duration::from_secs(5));
        Ok(digest)
    }
}

/// The dropbox refuses to let the staged file be deleted
struct UndeletableOriginal;

impl PromoteSteps for UndeletableOriginal {
    fn remove_original(&self, _file: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only dropbox"))
    }
}

/// A queue holding `file` as claimed by the mover
fn claimed(file: &Path) -> PendingQueue {
    let queue = PendingQueue::new();
    queue.enqueue(file.to_path_buf());
    assert_eq!(
        queue.take_ready(Duration::ZERO, SystemTime::now()),
        vec![file.to_path_buf()]
    );
    queue
}

struct Layout {
    _root: TempDir,
    dropbox: PathBuf,
    preservation: PathBuf,
    temp: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let dropbox = root.path().join("dropbox");
        let preservation = root.path().join("preservation");
        let temp = preservation.join(TEMP_DIR_NAME);
        fs::create_dir_all(&dropbox).unwrap();
        fs::create_dir_all(&preservation).unwrap();
        Self {
            _root: root,
            dropbox,
            preservation,
            temp,
        }
    }

    /// Stage a file with a checksum sidecar, returning the staged path
    fn stage(&self, relative: &str, content: &[u8], checksum: &str) -> PathBuf {
        let file = self.dropbox.join(relative);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, content).unwrap();
        fs::write(DropboxEntry::new(&file).checksum_path(), checksum).unwrap();
        file
    }

    fn watcher(&self, grace_period: Duration) -> DropboxWatcher {
        DropboxWatcher::new(
            &self.dropbox,
            &self.preservation,
            &self.temp,
            WatcherSettings {
                poll_interval: Duration::from_millis(10),
                move_interval: Duration::from_millis(10),
                grace_period,
            },
        )
    }

    fn temp_is_empty(&self) -> bool {
        !self.temp.exists() || fs::read_dir(&self.temp).unwrap().next().is_none()
    }
}

#[test]
fn sidecar_accepts_md5sum_output() {
    let text = "9A0364B9E99BB480DD25E1F0284C8555  content.txt\n";
    assert_eq!(parse_sidecar(text), "9a0364b9e99bb480dd25e1f0284c8555");
}

#[test]
fn sidecar_accepts_certutil_byte_dump() {
    let text = "MD5 hash of file content.txt:\r\n\
                9a 03 64 b9 e9 9b b4 80 dd 25 e1 f0 28 4c 85 55\r\n\
                CertUtil: -hashfile command completed successfully.\r\n";
    assert_eq!(parse_sidecar(text), "9a0364b9e99bb480dd25e1f0284c8555");
}

#[test]
fn sidecar_without_digest_is_returned_trimmed() {
    assert_eq!(parse_sidecar("  not a checksum \n"), "not a checksum");
}

#[test]
fn copy_and_hash_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    fs::write(&source, CONTENT).unwrap();

    assert_eq!(copy_and_hash(&source, &target).unwrap(), md5_hex(CONTENT));
    assert_eq!(fs::read(&target).unwrap(), CONTENT);
    assert!(copy_and_hash(&source, &target).is_err());
}

#[test]
fn sidecars_are_recognised() {
    assert!(DropboxEntry::is_sidecar(Path::new("/drop/a.tif.md5")));
    assert!(DropboxEntry::is_sidecar(Path::new("/drop/a.tif.log")));
    assert!(!DropboxEntry::is_sidecar(Path::new("/drop/a.tif")));

    let entry = DropboxEntry::new("/drop/a.tif");
    assert_eq!(entry.checksum_path(), PathBuf::from("/drop/a.tif.md5"));
    assert_eq!(entry.log_path(), PathBuf::from("/drop/a.tif.log"));
}

#[test]
fn file_without_checksum_is_not_eligible() {
    let layout = Layout::new();
    let file = layout.dropbox.join("lonely.bin");
    fs::write(&file, CONTENT).unwrap();

    assert!(!DropboxEntry::new(&file).is_eligible().unwrap());
    assert!(matches!(
        DropboxEntry::new(&file).expected_checksum(),
        Err(DropboxError::MissingChecksum(_))
    ));
}

#[test]
fn promote_moves_verified_file() {
    let layout = Layout::new();
    let file = layout.stage("image.tif", CONTENT, &md5_hex(CONTENT));
    let destination = layout.preservation.join("image.tif");

    let promoted = promote(&DropboxEntry::new(&file), &destination, &layout.temp).unwrap();

    assert_eq!(promoted, destination);
    assert_eq!(fs::read(&destination).unwrap(), CONTENT);
    assert!(!file.exists());
    assert!(layout.temp_is_empty());
}

#[test]
fn checksum_mismatch_leaves_file_in_place() {
    let layout = Layout::new();
    let file = layout.stage("data.bin", CONTENT, WRONG_MD5);
    let destination = layout.preservation.join("data.bin");

    let err = promote(&DropboxEntry::new(&file), &destination, &layout.temp).unwrap_err();

    assert!(err.is_terminal());
    assert!(err
        .to_string()
        .starts_with("Checksum mismatch for data.bin! (b0e5e8b3e6f9b3c86a6b1e1b1f0a3b0d != "));
    assert_eq!(fs::read(&file).unwrap(), CONTENT);
    assert!(!destination.exists());
    assert!(layout.temp_is_empty());
}

#[test]
fn existing_destination_is_never_replaced() {
    let layout = Layout::new();
    let file = layout.stage("report.pdf", CONTENT, &md5_hex(CONTENT));
    let destination = layout.preservation.join("report.pdf");
    fs::write(&destination, b"already preserved").unwrap();

    let err = promote(&DropboxEntry::new(&file), &destination, &layout.temp).unwrap_err();

    assert!(matches!(err, DropboxError::AlreadyExists(_)));
    assert!(err.to_string().contains("already exists in the preservation store"));
    assert_eq!(fs::read(&destination).unwrap(), b"already preserved");
    assert!(file.exists());
}

#[test]
fn vanished_file_is_reported() {
    let layout = Layout::new();
    let file = layout.stage("gone.bin", CONTENT, &md5_hex(CONTENT));
    fs::remove_file(&file).unwrap();

    let err = promote(
        &DropboxEntry::new(&file),
        &layout.preservation.join("gone.bin"),
        &layout.temp,
    )
    .unwrap_err();

    assert!(matches!(err, DropboxError::Vanished(_)));
    assert!(!err.is_terminal());
}

#[test]
fn file_modified_during_copy_is_retried_without_log() {
    let layout = Layout::new();
    let file = layout.stage("growing.mov", CONTENT, &md5_hex(CONTENT));
    let entry = DropboxEntry::new(&file);
    let destination = layout.preservation.join("growing.mov");
    let queue = claimed(&file);

    let result = promote_with(&TouchedDuringCopy, &entry, &destination, &layout.temp);
    assert!(matches!(result, Err(DropboxError::ModifiedDuringCopy(_))));

    let mut stats = MoveStats::default();
    settle(&queue, file.clone(), &entry, result, &mut stats);

    assert_eq!(
        stats,
        MoveStats {
            retried: 1,
            ..MoveStats::default()
        }
    );
    assert_eq!(queue.pending(), vec![file.clone()]);
    assert_eq!(fs::read(&file).unwrap(), CONTENT);
    assert!(!destination.exists());
    assert!(!entry.log_path().exists());
    assert!(layout.temp_is_empty());
}

#[test]
fn undeletable_original_is_still_logged_as_promoted() {
    let layout = Layout::new();
    let file = layout.stage("locked.tif", CONTENT, &md5_hex(CONTENT));
    let entry = DropboxEntry::new(&file);
    let earlier = SystemTime::now() - Duration::from_secs(60);
    set_mtime(&file, earlier);
    set_mtime(&entry.checksum_path(), earlier);
    let destination = layout.preservation.join("locked.tif");
    let queue = claimed(&file);

    let result = promote_with(&UndeletableOriginal, &entry, &destination, &layout.temp);
    assert_eq!(result.as_ref().unwrap(), &destination);

    let mut stats = MoveStats::default();
    settle(&queue, file.clone(), &entry, result, &mut stats);

    assert_eq!(stats.promoted, 1);
    assert!(queue.is_empty());
    assert_eq!(fs::read(&destination).unwrap(), CONTENT);
    assert!(file.exists());
    assert!(layout.temp_is_empty());

    let log = fs::read_to_string(entry.log_path()).unwrap();
    assert!(log.trim_end().ends_with(SUCCESS_MESSAGE));
    assert!(!log.contains("already exists"));
    // The success line keeps the leftover copy from being picked up again
    assert!(!entry.is_eligible().unwrap());
}

#[test]
fn newer_log_suppresses_eligibility_until_file_changes() {
    let layout = Layout::new();
    let file = layout.stage("scan.tif", CONTENT, WRONG_MD5);
    let entry = DropboxEntry::new(&file);
    let now = SystemTime::now();
    set_mtime(&file, now - Duration::from_secs(60));
    set_mtime(&entry.checksum_path(), now - Duration::from_secs(60));

    assert!(entry.is_eligible().unwrap());

    entry.append_log("Checksum mismatch for scan.tif!").unwrap();
    set_mtime(&entry.log_path(), now - Duration::from_secs(30));
    assert!(!entry.is_eligible().unwrap());

    // Re-uploading the file makes it eligible again
    set_mtime(&file, now);
    assert!(entry.is_eligible().unwrap());

    // So does a corrected checksum
    set_mtime(&file, now - Duration::from_secs(60));
    assert!(!entry.is_eligible().unwrap());
    set_mtime(&entry.checksum_path(), now);
    assert!(entry.is_eligible().unwrap());
}

#[test]
fn queue_hands_out_each_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.bin");
    fs::write(&file, CONTENT).unwrap();
    let queue = PendingQueue::new();

    assert!(queue.enqueue(file.clone()));
    assert!(!queue.enqueue(file.clone()));
    assert_eq!(queue.len(), 1);

    let ready = queue.take_ready(Duration::ZERO, SystemTime::now());
    assert_eq!(ready, vec![file.clone()]);
    assert!(queue.is_empty());

    // In flight files are not queued again by the scanner
    assert!(!queue.enqueue(file.clone()));

    queue.requeue(file.clone());
    assert_eq!(queue.pending(), vec![file.clone()]);

    let ready = queue.take_ready(Duration::ZERO, SystemTime::now());
    assert_eq!(ready.len(), 1);
    queue.finish(&file);
    assert!(queue.enqueue(file));
}

#[test]
fn queue_waits_for_grace_period_and_drops_vanished_files() {
    let dir = tempfile::tempdir().unwrap();
    let fresh = dir.path().join("fresh.bin");
    let gone = dir.path().join("gone.bin");
    fs::write(&fresh, CONTENT).unwrap();
    fs::write(&gone, CONTENT).unwrap();
    let queue = PendingQueue::new();
    queue.enqueue(fresh.clone());
    queue.enqueue(gone.clone());
    fs::remove_file(&gone).unwrap();

    let now = SystemTime::now();
    assert!(queue.take_ready(Duration::from_secs(60), now).is_empty());
    assert_eq!(queue.pending(), vec![fresh.clone()]);

    let later = now + Duration::from_secs(120);
    assert_eq!(queue.take_ready(Duration::from_secs(60), later), vec![fresh]);
}

#[tokio::test]
async fn watcher_promotes_eligible_files_and_logs_outcomes() {
    let layout = Layout::new();
    let good = layout.stage("batch/good.tif", CONTENT, &md5_hex(CONTENT));
    let bad = layout.stage("bad.tif", CONTENT, WRONG_MD5);
    fs::write(layout.dropbox.join("unpaired.tif"), CONTENT).unwrap();
    let earlier = SystemTime::now() - Duration::from_secs(60);
    set_mtime(&bad, earlier);
    set_mtime(&DropboxEntry::new(&bad).checksum_path(), earlier);
    let watcher = layout.watcher(Duration::ZERO);

    assert_eq!(watcher.scan_once().await.unwrap(), 2);
    assert_eq!(watcher.scan_once().await.unwrap(), 0);

    let stats = watcher.move_once().await;
    assert_eq!(
        stats,
        MoveStats {
            promoted: 1,
            rejected: 1,
            ..MoveStats::default()
        }
    );

    let destination = layout.preservation.join("batch/good.tif");
    assert_eq!(fs::read(&destination).unwrap(), CONTENT);
    assert!(!good.exists());
    let good_log = fs::read_to_string(DropboxEntry::new(&good).log_path()).unwrap();
    assert!(good_log.trim_end().ends_with(SUCCESS_MESSAGE));

    assert!(bad.exists());
    let bad_log = fs::read_to_string(DropboxEntry::new(&bad).log_path()).unwrap();
    assert!(bad_log.contains("Checksum mismatch for bad.tif!"));
    assert!(!layout.preservation.join("bad.tif").exists());
    assert!(layout.temp_is_empty());

    // The rejection log keeps the bad file from being queued again
    assert_eq!(watcher.scan_once().await.unwrap(), 0);
    assert!(watcher.queue().is_empty());
}

#[tokio::test]
async fn watcher_holds_recently_modified_files() {
    let layout = Layout::new();
    let file = layout.stage("busy.bin", CONTENT, &md5_hex(CONTENT));
    let watcher = layout.watcher(Duration::from_secs(3600));

    watcher.scan_once().await.unwrap();
    let stats = watcher.move_once().await;

    assert_eq!(stats.promoted, 0);
    assert!(file.exists());
    assert_eq!(watcher.queue().pending(), vec![file]);
}

#[tokio::test]
async fn started_watcher_moves_files_until_shutdown() {
    let layout = Layout::new();
    let watcher = layout.watcher(Duration::ZERO);
    watcher.start();

    let file = layout.stage("late.bin", CONTENT, &md5_hex(CONTENT));
    let destination = layout.preservation.join("late.bin");
    tokio::time::timeout(Duration::from_secs(10), async {
        while !destination.exists() || file.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("file was not promoted in time");

    watcher.shutdown().await;

    let after = layout.stage("after.bin", CONTENT, &md5_hex(CONTENT));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(after.exists());
}

#[tokio::test]
async fn daemon_tracks_numbered_dropbox_directories() {
    let root = tempfile::tempdir().unwrap();
    let watch_root = root.path().join("dropboxes");
    let pres_root = root.path().join("preservation");
    fs::create_dir_all(watch_root.join("123_smith")).unwrap();
    fs::create_dir_all(watch_root.join("scratch")).unwrap();
    fs::create_dir_all(&pres_root).unwrap();
    fs::write(watch_root.join("456_notes.txt"), b"not a directory").unwrap();

    let daemon = DropboxDaemon::new(&watch_root, &pres_root, &DropboxConfig::default());

    let summary = daemon.refresh().await.unwrap();
    assert_eq!(summary.started, vec![watch_root.join("123_smith")]);
    assert!(summary.stopped.is_empty());
    assert!(pres_root.join("123").is_dir());
    assert_eq!(daemon.temp_dir(), pres_root.join(TEMP_DIR_NAME));

    let again = daemon.refresh().await.unwrap();
    assert_eq!(again, RefreshSummary::default());

    fs::create_dir_all(watch_root.join("789_jones")).unwrap();
    fs::remove_dir_all(watch_root.join("123_smith")).unwrap();
    let summary = daemon.refresh().await.unwrap();
    assert_eq!(summary.started, vec![watch_root.join("789_jones")]);
    assert_eq!(summary.stopped, vec![watch_root.join("123_smith")]);
    assert_eq!(daemon.watched_dirs().await, vec![watch_root.join("789_jones")]);

    daemon.shutdown().await;
    assert!(daemon.watched_dirs().await.is_empty());
}

#[test]
fn daemon_maps_directory_names_to_destinations() {
    let daemon = DropboxDaemon::new("/watch", "/pres", &DropboxConfig::default());

    assert_eq!(
        daemon.destination_for("0042_archive"),
        Some(PathBuf::from("/pres/0042"))
    );
    assert_eq!(daemon.destination_for("42archive"), None);
    assert_eq!(daemon.destination_for("_42_archive"), None);
}
