// src/repository/client.rs

//! Transport for repository files and archives
//!
//! Everything that talks to a remote goes through `Fetcher`, so the sync
//! protocol and the downloader can be driven by HTTP, the local filesystem
//! or an in-memory mirror.

use crate::error::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a failed request
pub const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Retrieves the bytes behind a URI
pub trait Fetcher {
    /// Fetch the whole resource. A missing resource is `Error::NotFound`.
    fn fetch(&self, uri: &str) -> Result<Vec<u8>>;

    /// Size of the resource in bytes
    fn fetch_size(&self, uri: &str) -> Result<u64>;
}

/// HTTP client wrapper with retry support
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout and retry count
    pub fn new() -> Result<Self> {
        Self::with_settings(HTTP_TIMEOUT, MAX_RETRIES)
    }

    pub fn with_settings(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }

    /// Send a request built by `request`, retrying transport failures.
    /// HTTP error statuses are returned immediately.
    fn send_with_retry<F>(&self, uri: &str, request: F) -> Result<reqwest::blocking::Response>
    where
        F: Fn(&Client) -> reqwest::blocking::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match request(&self.client).send() {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Err(Error::NotFound(uri.to_string()));
                    }
                    if !status.is_success() {
                        return Err(Error::DownloadError(format!("HTTP {} from {}", status, uri)));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            uri, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, uri, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", uri);
        let response = self.send_with_retry(uri, |client| client.get(uri))?;
        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read body from {}: {}", uri, e)))?;

        info!("Fetched {} ({} bytes)", uri, bytes.len());
        Ok(bytes.to_vec())
    }

    fn fetch_size(&self, uri: &str) -> Result<u64> {
        let response = self.send_with_retry(uri, |client| client.head(uri))?;
        response
            .content_length()
            .ok_or_else(|| Error::DownloadError(format!("No content length reported by {}", uri)))
    }
}

/// Reads `file:` URIs and plain paths from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_for(uri: &str) -> Result<PathBuf> {
        match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| Error::ParseError(format!("Invalid file URI: {}", uri))),
            _ => Ok(PathBuf::from(uri)),
        }
    }

    fn map_io(uri: &str, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::NotFound {
            Error::NotFound(uri.to_string())
        } else {
            Error::Io(e)
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let path = Self::path_for(uri)?;
        debug!("Reading {}", path.display());
        fs::read(&path).map_err(|e| Self::map_io(uri, e))
    }

    fn fetch_size(&self, uri: &str) -> Result<u64> {
        let path = Self::path_for(uri)?;
        fs::metadata(&path)
            .map(|metadata| metadata.len())
            .map_err(|e| Self::map_io(uri, e))
    }
}

/// Serves preloaded responses and records every URI requested.
///
/// Handy for mirrors assembled in memory and for exercising the sync
/// protocol without a network.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(uri.into(), data.into());
    }

    pub fn remove(&mut self, uri: &str) -> Option<Vec<u8>> {
        self.files.remove(uri)
    }

    /// URIs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.borrow_mut().clear();
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(uri.to_string());
        self.files
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::NotFound(uri.to_string()))
    }

    fn fetch_size(&self, uri: &str) -> Result<u64> {
        self.files
            .get(uri)
            .map(|data| data.len() as u64)
            .ok_or_else(|| Error::NotFound(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_creation() {
        assert!(HttpFetcher::new().is_ok());
        assert!(HttpFetcher::with_settings(Duration::from_secs(5), 0).is_ok());
    }

    #[test]
    fn test_file_fetcher_paths_and_uris() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("specs.json");
        fs::write(&path, b"[]").unwrap();

        let uri = Url::from_file_path(&path).unwrap().to_string();
        assert_eq!(FileFetcher.fetch(&uri).unwrap(), b"[]");
        assert_eq!(FileFetcher.fetch(path.to_str().unwrap()).unwrap(), b"[]");
        assert_eq!(FileFetcher.fetch_size(&uri).unwrap(), 2);
    }

    #[test]
    fn test_file_fetcher_missing_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("absent");
        let err = FileFetcher.fetch(path.to_str().unwrap()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_memory_fetcher_records_requests() {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("mem://a", b"abc".to_vec());

        assert_eq!(fetcher.fetch("mem://a").unwrap(), b"abc");
        assert!(fetcher.fetch("mem://b").unwrap_err().is_not_found());
        assert_eq!(fetcher.fetch_size("mem://a").unwrap(), 3);
        assert_eq!(fetcher.requests(), vec!["mem://a", "mem://b"]);

        fetcher.clear_requests();
        assert!(fetcher.requests().is_empty());
    }
}
