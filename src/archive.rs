//! Archive sniffing and extraction
//!
//! The payload is sniffed before unpacking so that a release process that
//! switched compression (or a proxy serving an HTML error page) shows up as
//! a format mismatch instead of an opaque tar parse error.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use strum::Display;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::types::ArchiveFormat;

/// Offset of the `ustar` magic inside a tar header block
const USTAR_MAGIC_OFFSET: usize = 257;
const TAR_BLOCK: usize = 512;

/// What the downloaded payload looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PayloadKind {
    Tar,
    Gzip,
    Bzip2,
    Xz,
    Zip,
    Empty,
    Unknown,
}

/// Classify a payload from its leading bytes
pub fn sniff(header: &[u8]) -> PayloadKind {
    if header.is_empty() {
        return PayloadKind::Empty;
    }
    if header.starts_with(&[0x1f, 0x8b]) {
        return PayloadKind::Gzip;
    }
    if header.starts_with(b"BZh") {
        return PayloadKind::Bzip2;
    }
    if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        return PayloadKind::Xz;
    }
    if header.starts_with(b"PK\x03\x04") {
        return PayloadKind::Zip;
    }
    if header.len() >= USTAR_MAGIC_OFFSET + 5
        && &header[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        return PayloadKind::Tar;
    }
    PayloadKind::Unknown
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut header = Vec::with_capacity(TAR_BLOCK);
    file.by_ref().take(TAR_BLOCK as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Unpack `archive` into `dest`, which is recreated empty first.
///
/// Entries are unpacked with permissions preserved so the executable bit
/// survives; the `tar` crate refuses entries escaping `dest`.
pub fn extract(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<usize> {
    let header = read_header(archive).map_err(|e| {
        ProvisionError::extraction(format!("cannot read {}: {}", archive.display(), e))
    })?;

    let kind = sniff(&header);
    match (format, kind) {
        (ArchiveFormat::Tar, PayloadKind::Tar) => {}
        (expected, found) => {
            return Err(ProvisionError::extraction(format!(
                "{} is not a {} archive (payload looks like {})",
                archive.display(),
                expected,
                found
            )));
        }
    }

    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| {
            ProvisionError::extraction(format!("cannot clear {}: {}", dest.display(), e))
        })?;
    }
    fs::create_dir_all(dest).map_err(|e| {
        ProvisionError::extraction(format!("cannot create {}: {}", dest.display(), e))
    })?;

    let file = File::open(archive).map_err(|e| {
        ProvisionError::extraction(format!("cannot open {}: {}", archive.display(), e))
    })?;
    let mut tar = tar::Archive::new(file);
    tar.set_preserve_permissions(true);
    tar.set_preserve_mtime(true);

    let mut count = 0usize;
    let entries = tar
        .entries()
        .map_err(|e| ProvisionError::extraction(format!("corrupt archive: {}", e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| ProvisionError::extraction(format!("corrupt archive: {}", e)))?;
        let unpacked = entry.unpack_in(dest).map_err(|e| {
            ProvisionError::extraction(format!("cannot unpack entry: {}", e))
        })?;
        if unpacked {
            count += 1;
        } else {
            debug!(path = ?entry.path().ok(), "skipped entry outside extraction directory");
        }
    }

    info!(entries = count, dest = %dest.display(), "archive extracted");
    Ok(count)
}
