// src/repository/sync.rs

//! Synchronizing an index with a remote repository
//!
//! Incremental first: the quick index tells us which full names were added
//! and removed, and missing specs are fetched one by one. When the quick
//! index is unavailable, or more than `bulk_threshold` specs are missing, a
//! full snapshot replaces the index instead.

use crate::error::{Error, Result};
use crate::packages::spec::PackageSpec;
use crate::repository::client::Fetcher;
use crate::repository::index::RepositoryIndex;
use crate::repository::wire::{self, BulkEncoding, Encoding};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Default ceiling on the number of specs fetched individually
pub const DEFAULT_BULK_THRESHOLD: usize = 500;

impl RepositoryIndex {
    /// Bring this index in line with the repository at `remote_uri`.
    ///
    /// Changes are staged and only committed when synchronization succeeds,
    /// so a `RemoteSyncError` leaves the index exactly as it was. Individual
    /// specs that fail to download during an incremental update are logged
    /// and skipped.
    pub fn update(&mut self, remote_uri: &str, fetcher: &dyn Fetcher, bulk_threshold: usize) -> Result<&mut Self> {
        let mut staged = self.clone();

        let missing = match fetch_quick_index(remote_uri, fetcher) {
            Ok(published) => {
                let removed = staged.remove_extra(&published);
                let missing = staged.find_missing(&published);
                debug!(
                    "Quick index for {}: {} removed, {} missing",
                    remote_uri,
                    removed,
                    missing.len()
                );
                (missing.len() <= bulk_threshold).then_some(missing)
            }
            Err(e) => {
                info!("Falling back to bulk fetch for {}: {}", remote_uri, e);
                None
            }
        };

        match missing {
            Some(missing) => {
                let added = staged.update_with_missing(remote_uri, fetcher, &missing);
                info!(
                    "Updated {} of {} missing specifications from {}",
                    added,
                    missing.len(),
                    remote_uri
                );
            }
            None => {
                info!("Bulk updating source index for {}", remote_uri);
                let snapshot = fetch_bulk_index(remote_uri, fetcher)?;
                staged = snapshot.into_iter().collect();
            }
        }

        self.replace(staged);
        Ok(self)
    }

    /// Drop entries absent from `published`; returns how many were removed
    fn remove_extra(&mut self, published: &[String]) -> usize {
        let published: HashSet<&str> = published.iter().map(String::as_str).collect();
        let extra: Vec<String> = self
            .full_names()
            .filter(|name| !published.contains(name))
            .map(str::to_string)
            .collect();

        for name in &extra {
            self.remove_spec(name);
        }
        extra.len()
    }

    fn find_missing(&self, published: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        published
            .iter()
            .filter(|name| !self.contains(name) && seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    /// Fetch each missing spec; returns how many were added
    fn update_with_missing(&mut self, remote_uri: &str, fetcher: &dyn Fetcher, missing: &[String]) -> usize {
        let mut added = 0;
        for full_name in missing {
            match fetch_single_spec(remote_uri, fetcher, full_name) {
                Ok(spec) => {
                    self.add_spec(spec);
                    added += 1;
                }
                Err(e) => warn!("Failed to download spec {} from {}: {}", full_name, remote_uri, e),
            }
        }
        added
    }
}

/// Published full names, from `<uri>/quick/index.rz`
pub fn fetch_quick_index(remote_uri: &str, fetcher: &dyn Fetcher) -> Result<Vec<String>> {
    let data = fetcher.fetch(&wire::quick_index_uri(remote_uri))?;
    wire::decode_quick_index(&data)
}

/// One spec, binary encoding first and text second
pub fn fetch_single_spec(remote_uri: &str, fetcher: &dyn Fetcher, full_name: &str) -> Result<PackageSpec> {
    let mut last_error = None;

    for encoding in [Encoding::Binary, Encoding::Text] {
        let uri = wire::spec_uri(remote_uri, full_name, encoding);
        match fetcher.fetch(&uri).and_then(|data| wire::decode_spec(&data, encoding)) {
            Ok(spec) => return Ok(spec),
            Err(e) => {
                debug!("Unable to fetch {}: {}", uri, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::NotFound(full_name.to_string())))
}

/// A full snapshot, trying each bulk encoding in priority order
pub fn fetch_bulk_index(remote_uri: &str, fetcher: &dyn Fetcher) -> Result<Vec<PackageSpec>> {
    let mut last_error = None;

    for encoding in BulkEncoding::ALL {
        let uri = wire::bulk_uri(remote_uri, encoding);
        match fetcher.fetch(&uri).and_then(|data| wire::decode_bulk(&data, encoding)) {
            Ok(specs) => {
                info!("Fetched {} specifications from {}", specs.len(), uri);
                return Ok(specs);
            }
            Err(e) => {
                debug!("Unable to fetch {}: {}", uri, e);
                last_error = Some(e);
            }
        }
    }

    Err(Error::RemoteSyncError {
        uri: remote_uri.to_string(),
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no index encodings available".to_string()),
    })
}
