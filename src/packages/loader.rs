// src/packages/loader.rs

//! Declarative specification loader

use crate::error::{Error, Result};
use crate::packages::spec::PackageSpec;
use crate::packages::traits::SpecLoader;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Loads JSON specification files; nothing in them is evaluated
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpecLoader;

impl SpecLoader for JsonSpecLoader {
    fn load(&self, path: &Path) -> Result<PackageSpec> {
        debug!("Loading specification {}", path.display());

        let text = fs::read_to_string(path).map_err(|e| {
            Error::ParseError(format!("Failed to read specification {}: {}", path.display(), e))
        })?;

        PackageSpec::from_json(&text)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a-0.0.2.gemspec");
        fs::write(&path, r#"{"name": "a", "version": "0.0.2"}"#).unwrap();

        let spec = JsonSpecLoader.load(&path).unwrap();
        assert_eq!(spec.full_name(), "a-0.0.2");
    }

    #[test]
    fn test_load_invalid_file_names_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.gemspec");
        fs::write(&path, "Gem::Specification.new do |s|").unwrap();

        let err = JsonSpecLoader.load(&path).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
        assert!(err.to_string().contains("broken.gemspec"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = JsonSpecLoader.load(Path::new("/nonexistent/x.gemspec"));
        assert!(matches!(result, Err(Error::ParseError(_))));
    }
}
