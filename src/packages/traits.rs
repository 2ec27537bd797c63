// src/packages/traits.rs

//! Seams between the core and its collaborators: archive codec and
//! specification loader

use crate::error::Result;
use crate::packages::spec::PackageSpec;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A file recorded in a package archive, with its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the package install directory
    pub path: String,
    pub mode: u32,
    pub size: u64,
    /// Lowercase hex SHA-256 of `content`
    pub sha256: String,
    pub content: Vec<u8>,
}

impl ArchiveEntry {
    /// Build an entry, computing size and digest from the content
    pub fn new(path: impl Into<String>, mode: u32, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            mode,
            size: content.len() as u64,
            sha256: sha256_hex(&content),
            content,
        }
    }
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Reads and writes package archives
pub trait ArchiveCodec {
    /// Decode the specification embedded in an archive
    fn read_spec(&self, archive: &[u8]) -> Result<PackageSpec>;

    /// Enumerate the archive's file entries
    fn list_entries(&self, archive: &[u8]) -> Result<Vec<ArchiveEntry>>;

    /// Build a new archive for `spec` holding `entries`
    fn build(&self, spec: &PackageSpec, entries: &[ArchiveEntry]) -> Result<Vec<u8>>;
}

/// Turns a specification file into a `PackageSpec`.
///
/// Loading is the only way specification files enter the system, so callers
/// choose which loader (and therefore which trust level) applies. Only load
/// from trusted roots.
pub trait SpecLoader {
    fn load(&self, path: &Path) -> Result<PackageSpec>;
}
