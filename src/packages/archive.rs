// src/packages/archive.rs

//! Gem archive format
//!
//! An archive is a short text header followed by a gzip-compressed tarball:
//!
//! ```text
//! gemstone-archive 1
//! checksum = "<sha256 hex>"
//!
//! <gzip tar: metadata.json, data/<path>...>
//! ```
//!
//! The checksum is the SHA-256 of the whole archive with the hex field
//! replaced by `CHECKSUM_PLACEHOLDER`.

use crate::error::{Error, Result};
use crate::packages::spec::PackageSpec;
use crate::packages::traits::{ArchiveCodec, ArchiveEntry, sha256_hex};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::bytes::Regex;
use std::io::Read;
use std::ops::Range;
use std::path::{Component, Path};
use std::sync::LazyLock;
use tar::{Archive, Builder, Header};
use tracing::debug;

/// First line of every archive
pub const ARCHIVE_MAGIC: &str = "gemstone-archive 1";

/// Fixed-width stand-in for the checksum while digesting
pub const CHECKSUM_PLACEHOLDER: &str =
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";

const METADATA_ENTRY: &str = "metadata.json";
const DATA_PREFIX: &str = "data/";

static CHECKSUM_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^checksum = "([0-9A-Fa-f]{64})"$"#).expect("checksum pattern is valid")
});

/// Split an archive into its text header and compressed payload
fn split_archive(archive: &[u8]) -> Result<(&[u8], &[u8])> {
    if !archive.starts_with(ARCHIVE_MAGIC.as_bytes()) {
        return Err(Error::ParseError("Not a gem archive (bad magic)".to_string()));
    }

    let end = archive
        .windows(2)
        .position(|w| w == b"\n\n")
        .ok_or_else(|| Error::ParseError("Archive header is not terminated".to_string()))?;

    Ok((&archive[..end + 1], &archive[end + 2..]))
}

/// The declared checksum and the byte range of its hex digits, if present
pub fn declared_checksum(archive: &[u8]) -> Option<(String, Range<usize>)> {
    let (header, _) = split_archive(archive).ok()?;
    let captures = CHECKSUM_FIELD.captures(header)?;
    let digits = captures.get(1)?;
    let declared = String::from_utf8_lossy(digits.as_bytes()).to_lowercase();
    Some((declared, digits.range()))
}

/// True for non-empty relative paths made only of normal components
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Default archive codec
#[derive(Debug, Clone, Copy, Default)]
pub struct GemArchive;

impl GemArchive {
    fn open_payload(archive: &[u8]) -> Result<Archive<GzDecoder<&[u8]>>> {
        let (_, payload) = split_archive(archive)?;
        Ok(Archive::new(GzDecoder::new(payload)))
    }

    fn append(builder: &mut Builder<GzEncoder<Vec<u8>>>, path: &str, mode: u32, data: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(0);
        header.set_cksum();

        builder
            .append_data(&mut header, path, data)
            .map_err(|e| Error::ParseError(format!("Failed to add {} to archive: {}", path, e)))
    }
}

impl ArchiveCodec for GemArchive {
    fn read_spec(&self, archive: &[u8]) -> Result<PackageSpec> {
        let mut tar = Self::open_payload(archive)?;

        for entry in tar
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read entry: {}", e)))?;

            let entry_path = entry
                .path()
                .map_err(|e| Error::ParseError(format!("Failed to get entry path: {}", e)))?
                .to_string_lossy()
                .to_string();

            if entry_path == METADATA_ENTRY {
                let mut content = String::new();
                entry.read_to_string(&mut content).map_err(|e| {
                    Error::ParseError(format!("Failed to read {}: {}", METADATA_ENTRY, e))
                })?;
                return PackageSpec::from_json(&content);
            }
        }

        Err(Error::ParseError(format!("No {} found in archive", METADATA_ENTRY)))
    }

    fn list_entries(&self, archive: &[u8]) -> Result<Vec<ArchiveEntry>> {
        let mut tar = Self::open_payload(archive)?;
        let mut entries = Vec::new();

        for entry in tar
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read entry: {}", e)))?;

            if entry.header().entry_type().is_dir() {
                continue;
            }

            let entry_path = entry
                .path()
                .map_err(|e| Error::ParseError(format!("Failed to get entry path: {}", e)))?
                .to_string_lossy()
                .to_string();

            let Some(path) = entry_path.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let path = path.to_string();

            let mode = entry
                .header()
                .mode()
                .map_err(|e| Error::ParseError(format!("Failed to get file mode: {}", e)))?;

            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| Error::ParseError(format!("Failed to read file content: {}", e)))?;

            entries.push(ArchiveEntry::new(path, mode, content));
        }

        debug!("Listed {} entries from archive", entries.len());
        Ok(entries)
    }

    fn build(&self, spec: &PackageSpec, entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

        Self::append(&mut builder, METADATA_ENTRY, 0o644, spec.to_json()?.as_bytes())?;

        for entry in entries {
            if !is_safe_relative_path(&entry.path) {
                return Err(Error::ParseError(format!(
                    "Refusing to archive unsafe path: {}",
                    entry.path
                )));
            }
            Self::append(
                &mut builder,
                &format!("{}{}", DATA_PREFIX, entry.path),
                entry.mode,
                &entry.content,
            )?;
        }

        let payload = builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| Error::ParseError(format!("Failed to finish archive: {}", e)))?;

        let header = |checksum: &str| format!("{}\nchecksum = \"{}\"\n\n", ARCHIVE_MAGIC, checksum);

        let mut archive = header(CHECKSUM_PLACEHOLDER).into_bytes();
        archive.extend_from_slice(&payload);
        let checksum = sha256_hex(&archive);

        let mut signed = header(&checksum).into_bytes();
        signed.extend_from_slice(&payload);

        debug!("Built archive for {} ({} bytes)", spec.full_name(), signed.len());
        Ok(signed)
    }
}
