// src/filesystem.rs

//! On-disk repository layout
//!
//! ```text
//! <root>/specifications/<full_name>.gemspec
//! <root>/cache/<full_name>.gem
//! <root>/gems/<full_name>/...
//! ```

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of package archives
pub const ARCHIVE_EXTENSION: &str = "gem";

/// Extension of installed specification files
pub const SPEC_EXTENSION: &str = "gemspec";

/// Paths inside one install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    root: PathBuf,
}

impl RepositoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn specifications_dir(&self) -> PathBuf {
        self.root.join("specifications")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn gems_dir(&self) -> PathBuf {
        self.root.join("gems")
    }

    pub fn spec_path(&self, full_name: &str) -> PathBuf {
        self.specifications_dir()
            .join(format!("{}.{}", full_name, SPEC_EXTENSION))
    }

    pub fn archive_path(&self, full_name: &str) -> PathBuf {
        self.cache_dir()
            .join(format!("{}.{}", full_name, ARCHIVE_EXTENSION))
    }

    pub fn gem_dir(&self, full_name: &str) -> PathBuf {
        self.gems_dir().join(full_name)
    }

    /// Create the specifications, cache and gems directories
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.specifications_dir(), self.cache_dir(), self.gems_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::InitError(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = RepositoryLayout::new("/opt/gems");
        assert_eq!(layout.spec_path("a-1.0"), PathBuf::from("/opt/gems/specifications/a-1.0.gemspec"));
        assert_eq!(layout.archive_path("a-1.0"), PathBuf::from("/opt/gems/cache/a-1.0.gem"));
        assert_eq!(layout.gem_dir("a-1.0"), PathBuf::from("/opt/gems/gems/a-1.0"));
    }

    #[test]
    fn test_ensure_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("nested/root"));

        layout.ensure().unwrap();
        layout.ensure().unwrap();

        assert!(layout.specifications_dir().is_dir());
        assert!(layout.cache_dir().is_dir());
        assert!(layout.gems_dir().is_dir());
    }
}
