// src/config.rs

//! `gemstone.toml` configuration

use crate::error::{Error, Result};
use crate::packages::spec::{Platform, PlatformSet};
use crate::repository::DEFAULT_BULK_THRESHOLD;
use crate::repository::client::{HTTP_TIMEOUT, HttpFetcher, MAX_RETRIES};
use crate::resolver::Domain;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Install root holding `specifications/`, `cache/` and `gems/`
    pub root: PathBuf,
    /// Remote repository URIs
    pub sources: Vec<String>,
    /// Most specs fetched one at a time before falling back to a bulk fetch
    pub bulk_threshold: usize,
    pub domain: Domain,
    /// Platforms accepted in addition to `any` and the host
    pub platforms: Vec<String>,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("gemstone"),
            sources: Vec::new(),
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            domain: Domain::default(),
            platforms: Vec::new(),
            http: HttpConfig::default(),
        }
    }
}

/// HTTP fetcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: HTTP_TIMEOUT.as_secs(),
            max_retries: MAX_RETRIES,
        }
    }
}

impl HttpConfig {
    pub fn fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::with_settings(Duration::from_secs(self.timeout_secs), self.max_retries)
    }
}

impl Config {
    /// Load a TOML file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content).map_err(|e| match e {
            Error::ConfigError(msg) => Error::ConfigError(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.platform_set()?;
        Ok(config)
    }

    /// `any`, the host platform and every configured extra platform
    pub fn platform_set(&self) -> Result<PlatformSet> {
        let mut platforms = vec![Platform::local()];
        for text in &self.platforms {
            platforms.push(
                Platform::parse(text)
                    .map_err(|e| Error::ConfigError(format!("Invalid platform {:?}: {}", text, e)))?,
            );
        }
        Ok(PlatformSet::new(platforms))
    }
}
