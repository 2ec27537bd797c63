// src/integrity/mod.rs

//! Archive verification and installed-repository audits
//!
//! The archive checksum is self-referential: the archive declares a SHA-256
//! of itself computed with the checksum field blanked out. It detects
//! corruption and truncation. It does not detect tampering, since anyone
//! able to modify the archive can recompute the digest.

use crate::error::{Error, Result};
use crate::filesystem::RepositoryLayout;
use crate::packages::archive::{CHECKSUM_PLACEHOLDER, declared_checksum, is_safe_relative_path};
use crate::packages::traits::{ArchiveCodec, sha256_hex};
use crate::repository::index::RepositoryIndex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Check an archive against the checksum declared in its header
pub fn verify_archive_checksum(archive: &[u8]) -> Result<()> {
    if archive.is_empty() {
        return Err(Error::VerificationError("Archive is empty".to_string()));
    }

    let (declared, range) = declared_checksum(archive)
        .ok_or_else(|| Error::VerificationError("Archive declares no checksum".to_string()))?;

    let mut blanked = archive.to_vec();
    blanked[range].copy_from_slice(CHECKSUM_PLACEHOLDER.as_bytes());
    let actual = sha256_hex(&blanked);

    if actual != declared {
        return Err(Error::VerificationError(format!(
            "Checksum mismatch: expected {}, got {}",
            declared, actual
        )));
    }

    debug!("Checksum verified: {}", declared);
    Ok(())
}

/// Read and verify an archive on disk
pub fn verify_archive_file(path: &Path) -> Result<()> {
    let archive = fs::read(path).map_err(|e| {
        Error::VerificationError(format!("Cannot read archive {}: {}", path.display(), e))
    })?;
    verify_archive_checksum(&archive)
        .map_err(|e| Error::VerificationError(format!("{}: {}", path.display(), e)))
}

/// What is wrong with one path of an installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    MissingSpecFile,
    /// The cached archive is missing, unreadable or fails its checksum
    Verification(String),
    ContentMismatch,
    MissingFile,
    UnmanagedFile,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::MissingSpecFile => f.write_str("missing spec file"),
            Problem::Verification(reason) => write!(f, "archive verification failed: {}", reason),
            Problem::ContentMismatch => f.write_str("installed file differs from package"),
            Problem::MissingFile => f.write_str("installed file is missing"),
            Problem::UnmanagedFile => f.write_str("unmanaged file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Path relative to the install root or the package directory
    pub path: String,
    pub problem: Problem,
}

impl Finding {
    fn new(path: impl Into<String>, problem: Problem) -> Self {
        Self {
            path: path.into(),
            problem,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

/// Findings per package full name; an empty list means the package is clean
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    packages: BTreeMap<String, Vec<Finding>>,
}

impl AuditReport {
    pub fn findings(&self, full_name: &str) -> Option<&[Finding]> {
        self.packages.get(full_name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Finding])> {
        self.packages.iter().map(|(name, findings)| (name.as_str(), findings.as_slice()))
    }

    pub fn is_clean(&self) -> bool {
        self.packages.values().all(Vec::is_empty)
    }

    pub fn problem_count(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }
}

/// Compare every installed package against its archive.
///
/// Inconsistencies are reported as findings, never as errors.
pub fn audit_repository(index: &RepositoryIndex, layout: &RepositoryLayout, codec: &dyn ArchiveCodec) -> AuditReport {
    let mut report = AuditReport::default();

    for spec in index.iter() {
        let full_name = spec.full_name();
        let findings = audit_package(&full_name, layout, codec);
        if !findings.is_empty() {
            warn!("{} has {} integrity problems", full_name, findings.len());
        }
        report.packages.insert(full_name, findings);
    }

    info!(
        "Audited {} packages, {} problems found",
        report.packages.len(),
        report.problem_count()
    );
    report
}

fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn audit_package(full_name: &str, layout: &RepositoryLayout, codec: &dyn ArchiveCodec) -> Vec<Finding> {
    let mut findings = Vec::new();

    let spec_path = layout.spec_path(full_name);
    if !spec_path.is_file() {
        findings.push(Finding::new(
            relative_display(&spec_path, layout.root()),
            Problem::MissingSpecFile,
        ));
    }

    let archive_path = layout.archive_path(full_name);
    let archive_name = relative_display(&archive_path, layout.root());
    let archive = match fs::read(&archive_path) {
        Ok(archive) => archive,
        Err(e) => {
            findings.push(Finding::new(archive_name, Problem::Verification(e.to_string())));
            return findings;
        }
    };

    if let Err(e) = verify_archive_checksum(&archive) {
        findings.push(Finding::new(archive_name, Problem::Verification(e.to_string())));
        return findings;
    }

    let entries = match codec.list_entries(&archive) {
        Ok(entries) => entries,
        Err(e) => {
            findings.push(Finding::new(archive_name, Problem::Verification(e.to_string())));
            return findings;
        }
    };

    let gem_dir = layout.gem_dir(full_name);
    let mut managed = HashSet::new();

    for entry in &entries {
        if !is_safe_relative_path(&entry.path) {
            findings.push(Finding::new(
                entry.path.clone(),
                Problem::Verification(format!("unsafe path in {}", archive_name)),
            ));
            continue;
        }

        managed.insert(entry.path.clone());
        match fs::read(gem_dir.join(&entry.path)) {
            Ok(content) if sha256_hex(&content) == entry.sha256 => {}
            Ok(_) => findings.push(Finding::new(entry.path.clone(), Problem::ContentMismatch)),
            Err(_) => findings.push(Finding::new(entry.path.clone(), Problem::MissingFile)),
        }
    }

    let mut unmanaged: Vec<String> = WalkDir::new(&gem_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| relative_display(e.path(), &gem_dir))
        .filter(|path| !managed.contains(path))
        .collect();
    unmanaged.sort();

    findings.extend(unmanaged.into_iter().map(|path| Finding::new(path, Problem::UnmanagedFile)));
    findings
}
