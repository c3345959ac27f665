use crate::bag::error::BagError;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Reader adapter that digests every byte read through it
pub struct Md5Reader<R> {
    inner: R,
    hasher: Md5,
    bytes_read: u64,
}

impl<R: Read> Md5Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The raw digest and byte count of everything read so far
    pub fn finish(self) -> (Vec<u8>, u64) {
        (self.hasher.finalize().to_vec(), self.bytes_read)
    }
}

impl<R: Read> Read for Md5Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.bytes_read += read as u64;
        Ok(read)
    }
}

/// Stream a reader through MD5, returning the raw digest and the byte count
pub fn md5_reader<R: Read>(reader: R) -> io::Result<(Vec<u8>, u64)> {
    let mut reader = Md5Reader::new(reader);
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.finish())
}

pub fn md5_file(path: &Path) -> io::Result<(Vec<u8>, u64)> {
    md5_reader(File::open(path)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub logical_path: String,
    pub md5_hex: String,
    pub size: u64,
}

/// Payload digests, sorted by logical path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// `manifest-md5.txt` contents: `<hex>  data/<path>` per line
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}  data/{}\n", e.md5_hex, e.logical_path))
            .collect()
    }

    pub fn payload_byte_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn payload_file_count(&self) -> usize {
        self.entries.len()
    }

    /// `Payload-Oxum` value: `<octets>.<file count>`
    pub fn payload_oxum(&self) -> String {
        format!("{}.{}", self.payload_byte_size(), self.payload_file_count())
    }
}

/// Accumulates payload digests, keyed and ordered by logical path
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    entries: BTreeMap<String, ManifestEntry>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, logical_path: &str) -> bool {
        self.entries.contains_key(logical_path)
    }

    pub fn add_reader<R: Read>(&mut self, logical_path: &str, reader: R) -> Result<(), BagError> {
        if self.contains(logical_path) {
            return Err(BagError::DuplicatePath(logical_path.to_string()));
        }
        let (digest, size) = md5_reader(reader)?;
        self.add_digest(logical_path, &digest, size)
    }

    /// Record a digest computed while the file was read elsewhere
    pub fn add_digest(&mut self, logical_path: &str, digest: &[u8], size: u64) -> Result<(), BagError> {
        if self.contains(logical_path) {
            return Err(BagError::DuplicatePath(logical_path.to_string()));
        }
        self.entries.insert(
            logical_path.to_string(),
            ManifestEntry {
                logical_path: logical_path.to_string(),
                md5_hex: hex::encode(digest),
                size,
            },
        );
        Ok(())
    }

    pub fn build(self) -> Manifest {
        Manifest {
            entries: self.entries.into_values().collect(),
        }
    }
}

/// `tagmanifest-md5.txt` contents over already-rendered tag files
pub fn render_tag_manifest(tag_files: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = tag_files.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    sorted
        .into_iter()
        .map(|(name, content)| format!("{}  {}\n", hex::encode(Md5::digest(content.as_bytes())), name))
        .collect()
}
