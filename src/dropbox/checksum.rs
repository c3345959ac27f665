use md5::{Digest, Md5};
use regex::Regex;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::LazyLock;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

static HEX_DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{32}\b").expect("digest regex is valid")
});

// certutil prints "MD5 hash of file X:" followed by space separated bytes
static BYTE_DUMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{2}(?: [0-9a-f]{2}){15}\b").expect("byte dump regex is valid")
});

/// Extract the expected MD5 from a checksum sidecar.
///
/// Accepts a bare 32 hex digit token anywhere in the text (`md5sum` output,
/// a lone digest) or a 16 byte space separated dump. Anything else is returned
/// trimmed, as-is, and will simply fail comparison.
pub fn parse_sidecar(text: &str) -> String {
    if let Some(found) = HEX_DIGEST_RE.find(text) {
        return found.as_str().to_ascii_lowercase();
    }
    if let Some(found) = BYTE_DUMP_RE.find(text) {
        return found.as_str().replace(' ', "").to_ascii_lowercase();
    }
    text.trim().to_string()
}

/// Copy `source` to a new file at `target`, returning the hex MD5 of the bytes copied
pub fn copy_and_hash(source: &Path, target: &Path) -> io::Result<String> {
    let mut reader = File::open(source)?;
    let mut writer = File::options().write(true).create_new(true).open(target)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
    }

    writer.sync_all()?;
    Ok(hex::encode(hasher.finalize()))
}
