// src/resolver/plan.rs

//! Candidate sources and install plans

use crate::packages::spec::PackageSpec;
use std::fmt;

/// Where a candidate comes from. Ordered so that `Local` ranks above `Remote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Locality {
    Remote,
    Local,
}

/// Locality plus origin (archive path or repository URI). Used for ranking
/// and downloading, never for identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub locality: Locality,
    pub origin: String,
}

impl PackageSource {
    pub fn local(origin: impl Into<String>) -> Self {
        Self {
            locality: Locality::Local,
            origin: origin.into(),
        }
    }

    pub fn remote(origin: impl Into<String>) -> Self {
        Self {
            locality: Locality::Remote,
            origin: origin.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.locality == Locality::Local
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin)
    }
}

/// A spec paired with the source it would be installed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub spec: PackageSpec,
    pub source: PackageSource,
}

impl Candidate {
    pub fn new(spec: PackageSpec, source: PackageSource) -> Self {
        Self { spec, source }
    }
}

/// Install order: dependencies strictly before dependents, each full name
/// at most once. The last entry is the package that was asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    entries: Vec<Candidate>,
}

impl InstallPlan {
    pub(crate) fn new(entries: Vec<Candidate>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter()
    }

    pub fn full_names(&self) -> Vec<String> {
        self.entries.iter().map(|c| c.spec.full_name()).collect()
    }

    /// The explicitly requested package
    pub fn root(&self) -> Option<&Candidate> {
        self.entries.last()
    }
}

impl IntoIterator for InstallPlan {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
