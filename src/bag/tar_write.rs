use crate::bag::manifest::Md5Reader;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tar::{Builder, EntryType, Header, HeaderMode};

pub(crate) fn create_deterministic_tar<W: Write>(writer: W) -> Builder<W> {
    let mut tar = Builder::new(writer);
    tar.mode(HeaderMode::Deterministic);
    tar
}

fn regular_header(size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_size(size);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_entry_type(EntryType::Regular);
    header
}

/// Append an in-memory tag file
pub(crate) fn write_entry<T: Write>(tar: &mut Builder<T>, path: &str, data: &[u8]) -> io::Result<()> {
    let mut header = regular_header(data.len() as u64);
    tar.append_data(&mut header, path, data)
}

/// Stream a payload file into the archive, returning the MD5 and length of the bytes written
pub(crate) fn write_payload<T: Write>(
    tar: &mut Builder<T>,
    path: &str,
    source: &Path,
) -> io::Result<(Vec<u8>, u64)> {
    let file = File::open(source)?;
    let size = file.metadata()?.len();
    let mut header = regular_header(size);
    let mut reader = Md5Reader::new(file.take(size));

    tar.append_data(&mut header, path, &mut reader)?;
    if reader.bytes_read() != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} shrank while being archived", source.display()),
        ));
    }
    Ok(reader.finish())
}
