// src/repository/index.rs

//! In-memory catalog of package specifications
//!
//! A `RepositoryIndex` is a point-in-time view keyed by full name. It is
//! built by scanning specification directories or by synchronizing with a
//! remote (see `sync`), used for one operation and then dropped.

use crate::error::{Error, Result};
use crate::filesystem::{RepositoryLayout, SPEC_EXTENSION};
use crate::packages::loader::JsonSpecLoader;
use crate::packages::spec::PackageSpec;
use crate::packages::traits::{SpecLoader, sha256_hex};
use crate::version::Requirement;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How `search` selects package names
#[derive(Debug, Clone)]
pub enum NamePattern {
    /// Every name
    All,
    /// Exactly this name
    Exact(String),
    /// Names containing a match for the expression
    Regex(Regex),
}

impl NamePattern {
    pub fn exact(name: impl Into<String>) -> Self {
        NamePattern::Exact(name.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(NamePattern::Regex)
            .map_err(|e| Error::ParseError(format!("Invalid name pattern {:?}: {}", pattern, e)))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::All => true,
            NamePattern::Exact(exact) => exact == name,
            NamePattern::Regex(regex) => regex.is_match(name),
        }
    }
}

impl From<&str> for NamePattern {
    fn from(name: &str) -> Self {
        NamePattern::exact(name)
    }
}

/// Mapping from full name to specification
#[derive(Debug, Clone, Default)]
pub struct RepositoryIndex {
    specs: BTreeMap<String, PackageSpec>,
}

impl RepositoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index by scanning `dirs` for specification files
    pub fn from_directories<P: AsRef<Path>>(dirs: &[P], loader: &dyn SpecLoader) -> Self {
        let mut index = Self::new();
        index.load_from_directory(dirs, loader);
        index
    }

    /// Index of the specifications installed under `layout`
    pub fn from_installed(layout: &RepositoryLayout) -> Self {
        Self::from_directories(&[layout.specifications_dir()], &JsonSpecLoader)
    }

    /// Load the one file a caller asked for; parse failures are fatal here
    pub fn load_specification(path: &Path, loader: &dyn SpecLoader) -> Result<PackageSpec> {
        loader.load(path)
    }

    /// Replace the contents with every specification found in `dirs`.
    ///
    /// Files that fail to load are skipped with a warning. Missing
    /// directories are treated as empty.
    pub fn load_from_directory<P: AsRef<Path>>(&mut self, dirs: &[P], loader: &dyn SpecLoader) -> &mut Self {
        self.specs.clear();

        for dir in dirs {
            let dir = dir.as_ref();
            let files = match spec_files(dir) {
                Ok(files) => files,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Specification directory {} does not exist", dir.display());
                    continue;
                }
                Err(e) => {
                    warn!("Failed to scan {}: {}", dir.display(), e);
                    continue;
                }
            };

            for path in files {
                match loader.load(&path) {
                    Ok(spec) => self.add_spec(spec),
                    Err(e) => warn!("Skipping unreadable specification {}: {}", path.display(), e),
                }
            }
        }

        info!("Loaded {} specifications", self.specs.len());
        self
    }

    /// Insert or replace the entry for the spec's full name
    pub fn add_spec(&mut self, spec: PackageSpec) {
        self.specs.insert(spec.full_name(), spec);
    }

    pub fn remove_spec(&mut self, full_name: &str) -> Option<PackageSpec> {
        self.specs.remove(full_name)
    }

    pub fn specification(&self, full_name: &str) -> Option<&PackageSpec> {
        self.specs.get(full_name)
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.specs.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Entries in full-name order
    pub fn iter(&self) -> impl Iterator<Item = &PackageSpec> {
        self.specs.values()
    }

    pub fn full_names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Specs whose name matches and whose version satisfies `requirement`,
    /// ascending by version with ties broken by full name
    pub fn search(&self, pattern: &NamePattern, requirement: &Requirement) -> Vec<&PackageSpec> {
        let mut found: Vec<&PackageSpec> = self
            .specs
            .values()
            .filter(|spec| pattern.matches(spec.name()) && requirement.satisfied_by(spec.version()))
            .collect();

        found.sort_by(|a, b| {
            a.version()
                .cmp(b.version())
                .then_with(|| a.full_name().cmp(&b.full_name()))
        });
        found
    }

    /// Exact-name search
    pub fn find_name(&self, name: &str, requirement: &Requirement) -> Vec<&PackageSpec> {
        self.search(&NamePattern::exact(name), requirement)
    }

    /// The highest version of every name
    pub fn latest_per_name(&self) -> BTreeMap<String, &PackageSpec> {
        let mut latest: BTreeMap<String, &PackageSpec> = BTreeMap::new();
        for spec in self.search(&NamePattern::All, &Requirement::any()) {
            // search is ascending, so later entries win
            latest.insert(spec.name().to_string(), spec);
        }
        latest
    }

    /// Fingerprint of the set of full names. Not a security measure.
    pub fn signature(&self) -> String {
        let names: Vec<&str> = self.full_names().collect();
        sha256_hex(names.join(",").as_bytes())
    }

    /// Digest of one entry's canonical JSON
    pub fn spec_signature(&self, full_name: &str) -> Option<String> {
        let spec = self.specs.get(full_name)?;
        match spec.to_json() {
            Ok(json) => Some(sha256_hex(json.as_bytes())),
            Err(e) => {
                warn!("Failed to encode {}: {}", full_name, e);
                None
            }
        }
    }

    /// Names whose latest local version is below the latest in `remote`
    pub fn outdated(&self, remote: &RepositoryIndex) -> Vec<String> {
        let remote_latest = remote.latest_per_name();

        self.latest_per_name()
            .into_iter()
            .filter(|(name, local)| {
                remote_latest
                    .get(name)
                    .is_some_and(|newest| newest.version() > local.version())
            })
            .map(|(name, _)| name)
            .collect()
    }

    pub(crate) fn replace(&mut self, other: RepositoryIndex) {
        self.specs = other.specs;
    }
}

impl FromIterator<PackageSpec> for RepositoryIndex {
    fn from_iter<I: IntoIterator<Item = PackageSpec>>(iter: I) -> Self {
        let mut index = Self::new();
        for spec in iter {
            index.add_spec(spec);
        }
        index
    }
}

/// Specification files in `dir`, sorted by path
fn spec_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SPEC_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
