// src/resolver/mod.rs

//! Dependency resolution
//!
//! A `Resolver` turns a root request into an `InstallPlan`:
//! - candidates are gathered from archives in the working directory and
//!   from synchronized remote indexes
//! - the root's dependencies are expanded breadth-first
//! - the resulting working set is ordered by a `DependencyGraph`
//!
//! Two resolutions must not install into the same root at the same time;
//! nothing here locks the install directory.

pub mod graph;
pub mod install;
pub mod plan;

pub use graph::DependencyGraph;
pub use install::{ArchiveInstaller, Installer};
pub use plan::{Candidate, InstallPlan, Locality, PackageSource};

use crate::error::{Error, Result};
use crate::filesystem::ARCHIVE_EXTENSION;
use crate::packages::archive::GemArchive;
use crate::packages::spec::{Dependency, PlatformSet};
use crate::packages::traits::ArchiveCodec;
use crate::repository::RemoteSource;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which sources are searched for candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Local,
    Remote,
    #[default]
    Both,
}

impl Domain {
    pub fn includes_local(&self) -> bool {
        matches!(self, Domain::Local | Domain::Both)
    }

    pub fn includes_remote(&self) -> bool {
        matches!(self, Domain::Remote | Domain::Both)
    }
}

pub struct Resolver {
    domain: Domain,
    working_dir: PathBuf,
    sources: Vec<RemoteSource>,
    platforms: PlatformSet,
    codec: Box<dyn ArchiveCodec>,
}

impl Resolver {
    /// Search archives in `working_dir` and the given remote sources
    pub fn new(working_dir: impl Into<PathBuf>, sources: Vec<RemoteSource>) -> Self {
        Self {
            domain: Domain::default(),
            working_dir: working_dir.into(),
            sources,
            platforms: PlatformSet::default(),
            codec: Box::new(GemArchive),
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_platforms(mut self, platforms: PlatformSet) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn sources(&self) -> &[RemoteSource] {
        &self.sources
    }

    /// Every candidate satisfying `dependency`, ranked ascending by
    /// `(version, locality)`. The best candidate is last; among equal
    /// versions a local archive beats a remote one.
    pub fn find_candidates(&self, dependency: &Dependency) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        if self.domain.includes_local() {
            candidates.extend(self.local_candidates(dependency));
        }

        if self.domain.includes_remote() {
            for source in &self.sources {
                for spec in source.index.find_name(&dependency.name, &dependency.requirement) {
                    candidates.push(Candidate::new(spec.clone(), PackageSource::remote(source.uri.clone())));
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.spec
                .version()
                .cmp(b.spec.version())
                .then_with(|| a.source.locality.cmp(&b.source.locality))
        });

        debug!("Found {} candidates for {}", candidates.len(), dependency);
        candidates
    }

    /// Archives named `<name>-<digit>*.gem` in the working directory
    fn local_candidates(&self, dependency: &Dependency) -> Vec<Candidate> {
        let archives = match local_archives(&self.working_dir, &dependency.name) {
            Ok(archives) => archives,
            Err(e) => {
                debug!("Not scanning {}: {}", self.working_dir.display(), e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for path in archives {
            let spec = match fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| self.codec.read_spec(&bytes))
            {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("Skipping unreadable archive {}: {}", path.display(), e);
                    continue;
                }
            };

            if dependency.matches(&spec) {
                candidates.push(Candidate::new(spec, PackageSource::local(path.to_string_lossy())));
            }
        }
        candidates
    }

    /// Resolve `root` and, unless `ignore_dependencies`, everything it
    /// depends on.
    ///
    /// Expansion enqueues every platform-compatible candidate that satisfies
    /// a dependency, not just the best one, so one name may appear in the
    /// plan at several versions.
    pub fn resolve(&self, root: &Dependency, ignore_dependencies: bool) -> Result<InstallPlan> {
        let root_candidate = self
            .find_candidates(root)
            .pop()
            .ok_or_else(|| Error::PackageNotFound {
                name: root.name.clone(),
                requirement: root.requirement.to_string(),
            })?;

        info!("Resolving {} from {}", root_candidate.spec, root_candidate.source);

        if ignore_dependencies {
            return Ok(InstallPlan::new(vec![root_candidate]));
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut working_set: Vec<Candidate> = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::new();

        seen.insert(root_candidate.spec.full_name());
        working_set.push(root_candidate);
        queue.push_back(0);

        while let Some(current) = queue.pop_front() {
            let dependencies = working_set[current].spec.dependencies().to_vec();

            for dependency in &dependencies {
                // local candidates first
                for candidate in self.find_candidates(dependency).into_iter().rev() {
                    if !self.platforms.is_compatible(candidate.spec.platform()) {
                        debug!("Skipping {}: incompatible platform", candidate.spec);
                        continue;
                    }
                    if !seen.insert(candidate.spec.full_name()) {
                        continue;
                    }
                    queue.push_back(working_set.len());
                    working_set.push(candidate);
                }
            }
        }

        let mut graph = DependencyGraph::new();
        for candidate in &working_set {
            graph.add(candidate.spec.clone());
        }

        if let Some((spec, dependency)) = graph.unmet_dependencies().into_iter().next() {
            return Err(Error::InstallConflict {
                spec: spec.full_name(),
                dependency: dependency.to_string(),
            });
        }

        let entries = graph
            .dependency_order()
            .into_iter()
            .filter_map(|spec| {
                working_set
                    .iter()
                    .find(|candidate| candidate.spec == *spec)
                    .cloned()
            })
            .collect::<Vec<_>>();

        info!("Install plan has {} packages", entries.len());
        Ok(InstallPlan::new(entries))
    }
}

/// Files in `dir` named like an archive of `name`, sorted by path
fn local_archives(dir: &Path, name: &str) -> std::io::Result<Vec<PathBuf>> {
    let prefix = format!("{}-", name);
    let suffix = format!(".{}", ARCHIVE_EXTENSION);

    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let versioned = file_name
            .strip_prefix(&prefix)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));

        if versioned && file_name.ends_with(&suffix) && path.is_file() {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}
