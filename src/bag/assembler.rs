use crate::bag::error::BagError;
use crate::bag::info::{AptrustInfo, BagInfo, BAGIT_TXT};
use crate::bag::manifest::{md5_file, render_tag_manifest, Manifest, ManifestBuilder};
use crate::bag::tar_write::{create_deterministic_tar, write_entry, write_payload};
use crate::payload::source::validate_logical_path;
use crate::payload::{PayloadEntry, PayloadError, PayloadSource, StagingArea};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info, warn};

/// A bag that has been written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedBag {
    /// Archive file name, also the remote object key
    pub bag_name: String,
    pub archive_path: PathBuf,
    pub archive_len: u64,
    /// MD5 of the exact archive bytes
    pub archive_md5_hex: String,
    pub archive_md5_base64: String,
    pub payload_byte_size: u64,
    pub payload_file_count: usize,
    pub manifest_text: String,
}

/// One logical item packaged as a BagIt bag.
///
/// The payload is enumerated from `source` each time the bag is serialized.
/// Files a source stages for this bag live under `working_dir` and are removed
/// once serialization ends, whatever the outcome.
pub struct Bag<P: PayloadSource> {
    item_id: String,
    institution_id: String,
    bag_info: BagInfo,
    aptrust_info: AptrustInfo,
    source: P,
    working_dir: PathBuf,
}

impl<P: PayloadSource> Bag<P> {
    pub fn new(
        item_id: &str,
        institution_id: &str,
        bag_info: BagInfo,
        aptrust_info: AptrustInfo,
        source: P,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            item_id: item_id.to_string(),
            institution_id: institution_id.to_string(),
            bag_info,
            aptrust_info,
            source,
            working_dir: working_dir.into(),
        }
    }

    /// `<institution>.<item>`, the top-level directory inside the archive
    pub fn bag_name(&self) -> String {
        format!("{}.{}", self.institution_id, self.item_id)
    }

    pub fn archive_name(&self) -> String {
        format!("{}.tar", self.bag_name())
    }

    /// Write the bag as `<output_dir>/<institution>.<item>.tar`.
    ///
    /// The archive is built under a temporary name and only renamed into place
    /// once complete, so a failure never leaves a file at the advertised path.
    pub async fn serialize(
        &self,
        output_dir: &Path,
        include_transfer_metadata: bool,
    ) -> Result<SerializedBag, BagError> {
        let bag_name = self.bag_name();
        let archive_name = self.archive_name();
        let destination = output_dir.join(&archive_name);
        if destination.exists() {
            return Err(BagError::AlreadyExists(destination));
        }

        tokio::fs::create_dir_all(output_dir).await?;
        tokio::fs::create_dir_all(&self.working_dir).await?;
        let staging = StagingArea::create(&self.working_dir, &bag_name)?;

        let mut entries = self
            .source
            .list_payload_entries(&self.item_id, &staging)
            .await?;
        if entries.is_empty() {
            return Err(PayloadError::NotFound(self.item_id.clone()).into());
        }
        for entry in &entries {
            validate_logical_path(&entry.logical_path)?;
        }
        entries.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
        info!("Assembling {} with {} payload files", bag_name, entries.len());

        let partial = staging.allocate(&format!("{}.partial", archive_name))?;
        let job = ArchiveJob {
            prefix: bag_name.clone(),
            entries,
            bag_info: self.bag_info.clone(),
            aptrust_info: include_transfer_metadata.then(|| self.aptrust_info.clone()),
            target: partial.clone(),
        };
        let manifest = task::spawn_blocking(move || job.write())
            .await
            .map_err(|e| BagError::Archive(format!("Task panic: {e}")))??;

        if destination.exists() {
            return Err(BagError::AlreadyExists(destination));
        }
        staging
            .persist(&partial, &destination)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => BagError::AlreadyExists(destination.clone()),
                _ => BagError::Io(e),
            })?;

        let digest_path = destination.clone();
        let digest = task::spawn_blocking(move || md5_file(&digest_path))
            .await
            .map_err(|e| BagError::Archive(format!("Task panic: {e}")))
            .and_then(|r| r.map_err(BagError::Io));
        let (digest, archive_len) = match digest {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Removing {} after failing to digest it", destination.display());
                let _ = std::fs::remove_file(&destination);
                return Err(e);
            }
        };

        let released = staging.release();
        debug!("Released {} staged files for {}", released, bag_name);

        let serialized = SerializedBag {
            bag_name: archive_name,
            archive_path: destination,
            archive_len,
            archive_md5_hex: hex::encode(&digest),
            archive_md5_base64: STANDARD.encode(&digest),
            payload_byte_size: manifest.payload_byte_size(),
            payload_file_count: manifest.payload_file_count(),
            manifest_text: manifest.render(),
        };
        info!(
            "Serialized {} ({} bytes, md5 {})",
            serialized.archive_path.display(),
            serialized.archive_len,
            serialized.archive_md5_hex
        );
        Ok(serialized)
    }
}

/// Everything the blocking writer needs, owned
struct ArchiveJob {
    prefix: String,
    entries: Vec<PayloadEntry>,
    bag_info: BagInfo,
    aptrust_info: Option<AptrustInfo>,
    target: PathBuf,
}

impl ArchiveJob {
    fn write(self) -> Result<Manifest, BagError> {
        let archive_error = |e: std::io::Error| BagError::Archive(e.to_string());
        let file = File::create(&self.target)?;
        let mut tar = create_deterministic_tar(BufWriter::new(file));

        // Payload first: each file is digested by the same read that archives it
        let mut builder = ManifestBuilder::new();
        for entry in &self.entries {
            if builder.contains(&entry.logical_path) {
                return Err(BagError::DuplicatePath(entry.logical_path.clone()));
            }
            let (digest, size) = write_payload(
                &mut tar,
                &format!("{}/data/{}", self.prefix, entry.logical_path),
                &entry.path,
            )
            .map_err(archive_error)?;
            builder.add_digest(&entry.logical_path, &digest, size)?;
        }
        let manifest = builder.build();
        let manifest_text = manifest.render();

        let mut tag_files: Vec<(&str, String)> = vec![
            ("bagit.txt", BAGIT_TXT.to_string()),
            ("bag-info.txt", self.bag_info.render(&manifest.payload_oxum())),
        ];
        if let Some(aptrust_info) = &self.aptrust_info {
            tag_files.push(("aptrust-info.txt", aptrust_info.render()));
        }
        tag_files.push(("manifest-md5.txt", manifest_text));

        let tag_refs: Vec<(&str, &str)> = tag_files
            .iter()
            .map(|(name, content)| (*name, content.as_str()))
            .collect();
        let tag_manifest = render_tag_manifest(&tag_refs);

        for (name, content) in tag_refs {
            write_entry(&mut tar, &format!("{}/{}", self.prefix, name), content.as_bytes())
                .map_err(archive_error)?;
        }
        write_entry(
            &mut tar,
            &format!("{}/tagmanifest-md5.txt", self.prefix),
            tag_manifest.as_bytes(),
        )
        .map_err(archive_error)?;

        let mut writer = tar.into_inner().map_err(archive_error)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| archive_error(e.into_error()))?;
        file.sync_all()?;

        Ok(manifest)
    }
}
