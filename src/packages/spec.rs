// src/packages/spec.rs

//! Package specifications
//!
//! A `PackageSpec` is the parsed, immutable description of one package
//! version: identity, platform, declared dependencies and file manifest.

use crate::error::{Error, Result};
use crate::version::{Requirement, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Marker string for the universal platform
pub const ANY_PLATFORM: &str = "any";

/// Platform a package was built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Platform {
    /// Pure packages installable everywhere
    #[default]
    Any,
    /// `cpu-os[-version]`, e.g. `x86_64-linux` or `universal-darwin-8`
    Specific {
        cpu: String,
        os: String,
        version: Option<String>,
    },
}

impl Platform {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() || text == ANY_PLATFORM || text == "ruby" {
            return Ok(Platform::Any);
        }

        let mut parts = text.splitn(3, '-');
        let cpu = parts.next().unwrap_or_default();
        let os = parts.next().unwrap_or_default();
        let version = parts.next().filter(|v| !v.is_empty());
        if cpu.is_empty() || os.is_empty() {
            return Err(Error::ParseError(format!("Invalid platform: {}", text)));
        }
        if [cpu, os].into_iter().chain(version).any(|part| !is_plain_segment(part)) {
            return Err(Error::ParseError(format!("Invalid platform: {:?}", text)));
        }

        Ok(Platform::Specific {
            cpu: cpu.to_string(),
            os: os.to_string(),
            version: version.map(str::to_string),
        })
    }

    /// The platform of the running process
    pub fn local() -> Self {
        Platform::Specific {
            cpu: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_string(),
            version: None,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Platform::Any)
    }
}

/// A name segment that is usable as part of a single path component
fn is_plain_segment(text: &str) -> bool {
    !text.is_empty()
        && text != "."
        && text != ".."
        && !text.contains(['/', '\\'])
        && !text.chars().any(char::is_whitespace)
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Any => f.write_str(ANY_PLATFORM),
            Platform::Specific { cpu, os, version } => {
                write!(f, "{}-{}", cpu, os)?;
                if let Some(version) = version {
                    write!(f, "-{}", version)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Platform::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Platforms the current runtime accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSet {
    platforms: Vec<Platform>,
}

impl PlatformSet {
    /// The universal marker plus the given platforms
    pub fn new(extra: impl IntoIterator<Item = Platform>) -> Self {
        let mut platforms = vec![Platform::Any];
        for platform in extra {
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        Self { platforms }
    }

    pub fn is_compatible(&self, platform: &Platform) -> bool {
        self.platforms.contains(platform)
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }
}

impl Default for PlatformSet {
    /// Universal marker and the host platform
    fn default() -> Self {
        Self::new([Platform::local()])
    }
}

/// A named dependency with a version requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub requirement: Requirement,
}

impl Dependency {
    pub fn new(name: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            name: name.into(),
            requirement,
        }
    }

    /// Parse the requirement text; empty text means the default requirement
    pub fn parse(name: impl Into<String>, requirement: &str) -> Result<Self> {
        Ok(Self::new(name, Requirement::parse(requirement)?))
    }

    pub fn matches(&self, spec: &PackageSpec) -> bool {
        spec.name() == self.name && self.requirement.satisfied_by(spec.version())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.requirement)
    }
}

fn default_require_paths() -> Vec<String> {
    vec!["lib".to_string()]
}

/// Parsed description of one package version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    name: String,
    version: Version,
    #[serde(default)]
    platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    executables: Vec<String>,
    #[serde(default = "default_require_paths")]
    require_paths: Vec<String>,
}

impl PackageSpec {
    /// Create a spec for `name` at `version` on the universal platform
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            platform: Platform::Any,
            summary: None,
            dependencies: Vec::new(),
            files: Vec::new(),
            executables: Vec::new(),
            require_paths: default_require_paths(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_executables(mut self, executables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.executables.extend(executables.into_iter().map(Into::into));
        self
    }

    pub fn with_require_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.require_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Decode the declarative JSON form
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(text)
            .map_err(|e| Error::ParseError(format!("Invalid specification: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Canonical JSON written to the specifications directory
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::ParseError(format!("Failed to encode specification: {}", e)))
    }

    /// Reject names that cannot form a usable full name or directory
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::ParseError("Specification has an empty name".to_string()));
        }
        if !is_plain_segment(&self.name) {
            return Err(Error::ParseError(format!("Invalid package name: {:?}", self.name)));
        }

        let full_name = self.full_name();
        let mut components = Path::new(&full_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(Error::ParseError(format!("Invalid full name: {:?}", full_name))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn executables(&self) -> &[String] {
        &self.executables
    }

    pub fn require_paths(&self) -> &[String] {
        &self.require_paths
    }

    /// `name-version`, with `-platform` appended for non-universal platforms
    pub fn full_name(&self) -> String {
        if self.platform.is_any() {
            format!("{}-{}", self.name, self.version)
        } else {
            format!("{}-{}-{}", self.name, self.version, self.platform)
        }
    }

    /// Archive file name, `full_name.gem`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.full_name(), crate::filesystem::ARCHIVE_EXTENSION)
    }
}

impl PartialEq for PackageSpec {
    fn eq(&self, other: &Self) -> bool {
        self.full_name() == other.full_name()
    }
}

impl Eq for PackageSpec {}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
