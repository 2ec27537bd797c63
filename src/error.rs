// src/error.rs

use thiserror::Error;

/// Core error types for Gemstone
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Initialization error (HTTP client, directories)
    #[error("Failed to initialize: {0}")]
    InitError(String),

    /// Malformed version, requirement, platform or specification text
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration file could not be read or decoded
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No candidate satisfies a requirement
    #[error("Could not find {name} ({requirement}) locally or in a repository")]
    PackageNotFound { name: String, requirement: String },

    /// Every index encoding failed during synchronization
    #[error("Error fetching remote index from {uri}: {reason}")]
    RemoteSyncError { uri: String, reason: String },

    /// Download source uses a scheme this core cannot handle
    #[error("Unsupported source URI scheme '{scheme}' for {source_uri}")]
    UnsupportedSource { scheme: String, source_uri: String },

    /// Archive checksum mismatch or unreadable archive
    #[error("Verification failed: {0}")]
    VerificationError(String),

    /// Declared dependency cannot be satisfied within the chosen set
    #[error("{spec} requires {dependency}, which cannot be satisfied by the selected packages")]
    InstallConflict { spec: String, dependency: String },

    /// Transport found nothing at the given URI
    #[error("Nothing found at {0}")]
    NotFound(String),

    /// Any other transport failure
    #[error("Download error: {0}")]
    DownloadError(String),
}

impl Error {
    /// True when a fetch failed because the remote has nothing at that path
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using Gemstone's Error type
pub type Result<T> = std::result::Result<T, Error>;
