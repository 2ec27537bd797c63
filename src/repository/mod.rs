// src/repository/mod.rs

//! Repository indexes and remote synchronization
//!
//! This module provides functionality for:
//! - Holding package specifications in a `RepositoryIndex`
//! - Synchronizing an index with a remote repository
//! - Encoding and decoding the index wire formats
//! - Fetching repository files over HTTP or from disk

pub mod client;
pub mod index;
pub mod sync;
pub mod wire;

pub use client::{FileFetcher, Fetcher, HttpFetcher, MemoryFetcher};
pub use index::{NamePattern, RepositoryIndex};
pub use sync::DEFAULT_BULK_THRESHOLD;

use crate::error::Result;
use tracing::info;

/// A remote repository and the index synchronized from it
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub uri: String,
    pub index: RepositoryIndex,
}

impl RemoteSource {
    /// A source with an empty index; call `refresh` to populate it
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            index: RepositoryIndex::new(),
        }
    }

    /// A source with an index that is already populated
    pub fn with_index(uri: impl Into<String>, index: RepositoryIndex) -> Self {
        Self {
            uri: uri.into(),
            index,
        }
    }

    /// Synchronize the index with the remote
    pub fn refresh(&mut self, fetcher: &dyn Fetcher, bulk_threshold: usize) -> Result<()> {
        info!("Synchronizing repository: {}", self.uri);
        self.index.update(&self.uri, fetcher, bulk_threshold)?;
        info!("Repository {} lists {} specifications", self.uri, self.index.len());
        Ok(())
    }
}

/// Fetch and synchronize every source in `uris`
pub fn sync_sources(uris: &[String], fetcher: &dyn Fetcher, bulk_threshold: usize) -> Result<Vec<RemoteSource>> {
    uris.iter()
        .map(|uri| {
            let mut source = RemoteSource::new(uri.clone());
            source.refresh(fetcher, bulk_threshold)?;
            Ok(source)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::spec::PackageSpec;
    use crate::repository::wire::{self, BulkEncoding};
    use crate::version::Version;

    #[test]
    fn test_sync_sources() {
        let uri = "http://mirror.example.com";
        let spec = PackageSpec::new("a", Version::parse("1").unwrap());
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert(
            wire::bulk_uri(uri, BulkEncoding::Text),
            wire::encode_bulk(&[&spec], BulkEncoding::Text).unwrap(),
        );

        let sources = sync_sources(&[uri.to_string()], &fetcher, DEFAULT_BULK_THRESHOLD).unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].index.contains("a-1"));

        assert!(sync_sources(&["http://down.example.com".to_string()], &fetcher, 10).is_err());
    }
}
