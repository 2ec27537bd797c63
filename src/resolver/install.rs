// src/resolver/install.rs

//! Downloading and installing a resolved plan

use crate::error::{Error, Result};
use crate::filesystem::RepositoryLayout;
use crate::integrity::verify_archive_checksum;
use crate::packages::archive::{GemArchive, is_safe_relative_path};
use crate::packages::spec::PackageSpec;
use crate::packages::traits::ArchiveCodec;
use crate::repository::client::Fetcher;
use crate::repository::wire;
use crate::resolver::plan::{InstallPlan, PackageSource};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Installs one archive into a repository root
pub trait Installer {
    /// Install the archive at `archive_path`, returning its specification
    fn install(&self, archive_path: &Path) -> Result<PackageSpec>;
}

/// Default installer: verify, extract into `gems/<full_name>/`, write the
/// specification file and keep the archive in `cache/`
pub struct ArchiveInstaller {
    layout: RepositoryLayout,
    codec: Box<dyn ArchiveCodec>,
}

impl ArchiveInstaller {
    pub fn new(layout: RepositoryLayout) -> Self {
        Self {
            layout,
            codec: Box::new(GemArchive),
        }
    }

    pub fn with_codec(mut self, codec: Box<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }
}

impl Installer for ArchiveInstaller {
    fn install(&self, archive_path: &Path) -> Result<PackageSpec> {
        let archive = fs::read(archive_path)?;
        verify_archive_checksum(&archive)?;

        let spec = self.codec.read_spec(&archive)?;
        let entries = self.codec.list_entries(&archive)?;
        let full_name = spec.full_name();
        info!("Installing {} from {}", full_name, archive_path.display());

        if let Some(entry) = entries.iter().find(|e| !is_safe_relative_path(&e.path)) {
            return Err(Error::VerificationError(format!(
                "{} contains unsafe path {}",
                full_name, entry.path
            )));
        }

        self.layout.ensure()?;
        let gem_dir = self.layout.gem_dir(&full_name);

        for entry in &entries {
            let target = gem_dir.join(&entry.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &entry.content)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(entry.mode & 0o7777))?;
            }
            debug!("Extracted {}", target.display());
        }

        fs::write(self.layout.spec_path(&full_name), spec.to_json()?)?;

        let cached = self.layout.archive_path(&full_name);
        if cached != archive_path {
            fs::write(&cached, &archive)?;
        }

        info!("Installed {} ({} files)", full_name, entries.len());
        Ok(spec)
    }
}

/// Downloads archives into a layout's cache and feeds them to an installer
pub struct InstallContext<'a> {
    layout: &'a RepositoryLayout,
    fetcher: &'a dyn Fetcher,
    installer: &'a dyn Installer,
}

impl<'a> InstallContext<'a> {
    pub fn new(layout: &'a RepositoryLayout, fetcher: &'a dyn Fetcher, installer: &'a dyn Installer) -> Self {
        Self {
            layout,
            fetcher,
            installer,
        }
    }

    /// Bring the archive for `spec` into the cache and return its path.
    ///
    /// Local archives are always copied over the cached one; if the copy is
    /// not permitted the original path is returned instead. Remote archives
    /// are fetched from `<origin>/gems/` only when not already cached.
    pub fn download(&self, spec: &PackageSpec, source: &PackageSource) -> Result<PathBuf> {
        let cached = self.layout.archive_path(&spec.full_name());

        if source.is_local() {
            let path = local_path(&source.origin)?;
            return self.copy_local(&path, &cached);
        }

        check_remote_scheme(&source.origin)?;
        if cached.exists() {
            debug!("Using cached {}", cached.display());
            return Ok(cached);
        }

        let uri = wire::archive_uri(&source.origin, &spec.file_name());
        let data = self.fetcher.fetch(&uri)?;
        write_atomically(&cached, &data)?;
        info!("Downloaded {} to {}", uri, cached.display());
        Ok(cached)
    }

    fn copy_local(&self, path: &Path, cached: &Path) -> Result<PathBuf> {
        if path == cached {
            return Ok(cached.to_path_buf());
        }

        let copied = cached
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(path, cached));

        match copied {
            Ok(_) => Ok(cached.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!("Cannot cache {}: {}, using it in place", path.display(), e);
                Ok(path.to_path_buf())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Download and install every entry of `plan` in order.
    ///
    /// Entries already installed are skipped, except the last one, which
    /// was asked for explicitly. The first failure stops the run; entries
    /// installed before it stay installed.
    pub fn install_plan(&self, plan: &InstallPlan, installed: &HashSet<String>) -> Result<Vec<PackageSpec>> {
        let mut results = Vec::new();
        let last = plan.len().saturating_sub(1);

        for (position, candidate) in plan.iter().enumerate() {
            let full_name = candidate.spec.full_name();
            if position != last && installed.contains(&full_name) {
                info!("Skipping {}: already installed", full_name);
                continue;
            }

            let archive = self.download(&candidate.spec, &candidate.source)?;
            results.push(self.installer.install(&archive)?);
        }

        Ok(results)
    }
}

/// Filesystem path behind a local origin: a plain path or a `file:` URI
fn local_path(origin: &str) -> Result<PathBuf> {
    match Url::parse(origin) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| Error::ParseError(format!("Invalid file URI: {}", origin))),
        // Single letters are Windows drive prefixes, not schemes
        Ok(url) if url.scheme().len() > 1 => Err(unsupported(url.scheme(), origin)),
        _ => Ok(PathBuf::from(origin)),
    }
}

/// Remote origins may be http(s), `file:` mirrors or plain mirror paths
fn check_remote_scheme(origin: &str) -> Result<()> {
    match Url::parse(origin) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => Ok(()),
        Ok(url) if url.scheme().len() > 1 => Err(unsupported(url.scheme(), origin)),
        _ => Ok(()),
    }
}

fn unsupported(scheme: &str, origin: &str) -> Error {
    Error::UnsupportedSource {
        scheme: scheme.to_string(),
        source_uri: origin.to_string(),
    }
}

/// Write to a temporary file, then rename into place
fn write_atomically(dest: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = dest.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::traits::ArchiveEntry;
    use crate::repository::client::MemoryFetcher;
    use crate::resolver::plan::Candidate;
    use crate::version::Version;
    use std::cell::RefCell;

    fn spec(name: &str, version: &str) -> PackageSpec {
        PackageSpec::new(name, Version::parse(version).unwrap())
    }

    fn build(spec: &PackageSpec) -> Vec<u8> {
        let entries: Vec<ArchiveEntry> = spec
            .files()
            .iter()
            .map(|f| ArchiveEntry::new(f.clone(), 0o644, format!("# {}\n", f)))
            .collect();
        GemArchive.build(spec, &entries).unwrap()
    }

    /// Records what it was asked to install; fails on a chosen name
    #[derive(Default)]
    struct RecordingInstaller {
        installed: RefCell<Vec<String>>,
        fail_on: Option<String>,
    }

    impl Installer for RecordingInstaller {
        fn install(&self, archive_path: &Path) -> Result<PackageSpec> {
            let spec = GemArchive.read_spec(&fs::read(archive_path)?)?;
            if self.fail_on.as_deref() == Some(spec.name()) {
                return Err(Error::VerificationError(format!("refusing {}", spec.name())));
            }
            self.installed.borrow_mut().push(spec.full_name());
            Ok(spec)
        }
    }

    #[test]
    fn test_download_local_copies_into_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        let a = spec("a", "1.0");
        let source_path = temp_dir.path().join(a.file_name());
        fs::write(&source_path, build(&a)).unwrap();

        let fetcher = MemoryFetcher::new();
        let installer = RecordingInstaller::default();
        let context = InstallContext::new(&layout, &fetcher, &installer);

        let path = context
            .download(&a, &PackageSource::local(source_path.to_string_lossy()))
            .unwrap();
        assert_eq!(path, layout.archive_path("a-1.0"));
        assert!(path.exists());

        let uri = Url::from_file_path(&source_path).unwrap().to_string();
        assert_eq!(context.download(&a, &PackageSource::local(uri)).unwrap(), path);
    }

    #[test]
    fn test_download_remote_uses_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path());
        let a = spec("a", "1.0");

        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("http://gems.example.com/gems/a-1.0.gem", build(&a));
        let installer = RecordingInstaller::default();
        let context = InstallContext::new(&layout, &fetcher, &installer);
        let source = PackageSource::remote("http://gems.example.com");

        let path = context.download(&a, &source).unwrap();
        assert_eq!(path, layout.archive_path("a-1.0"));
        context.download(&a, &source).unwrap();
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_download_unsupported_scheme() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path());
        let fetcher = MemoryFetcher::new();
        let installer = RecordingInstaller::default();
        let context = InstallContext::new(&layout, &fetcher, &installer);

        let err = context
            .download(&spec("a", "1.0"), &PackageSource::remote("ftp://gems.example.com"))
            .unwrap_err();
        match err {
            Error::UnsupportedSource { scheme, .. } => assert_eq!(scheme, "ftp"),
            other => panic!("unexpected error: {}", other),
        }
    }

    fn local_plan(dir: &Path, specs: &[PackageSpec]) -> InstallPlan {
        InstallPlan::new(
            specs
                .iter()
                .map(|s| {
                    let path = dir.join(s.file_name());
                    fs::write(&path, build(s)).unwrap();
                    Candidate::new(s.clone(), PackageSource::local(path.to_string_lossy()))
                })
                .collect(),
        )
    }

    #[test]
    fn test_install_plan_skips_installed_except_last() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        let plan = local_plan(temp_dir.path(), &[spec("bar", "1.0"), spec("foo", "1.0")]);

        let fetcher = MemoryFetcher::new();
        let installer = RecordingInstaller::default();
        let context = InstallContext::new(&layout, &fetcher, &installer);

        let installed: HashSet<String> = ["bar-1.0".to_string(), "foo-1.0".to_string()].into();
        context.install_plan(&plan, &installed).unwrap();
        assert_eq!(*installer.installed.borrow(), vec!["foo-1.0".to_string()]);
    }

    #[test]
    fn test_install_plan_stops_at_first_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        let plan = local_plan(
            temp_dir.path(),
            &[spec("a", "1"), spec("b", "1"), spec("c", "1")],
        );

        let fetcher = MemoryFetcher::new();
        let installer = RecordingInstaller {
            fail_on: Some("b".to_string()),
            ..Default::default()
        };
        let context = InstallContext::new(&layout, &fetcher, &installer);

        assert!(context.install_plan(&plan, &HashSet::new()).is_err());
        assert_eq!(*installer.installed.borrow(), vec!["a-1".to_string()]);
    }

    #[test]
    fn test_archive_installer_extracts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        let p = spec("p", "1.0").with_files(["lib/a.rb", "bin/p"]);
        let archive_path = temp_dir.path().join(p.file_name());
        fs::write(&archive_path, build(&p)).unwrap();

        let installed = ArchiveInstaller::new(layout.clone()).install(&archive_path).unwrap();
        assert_eq!(installed.full_name(), "p-1.0");
        assert_eq!(
            fs::read_to_string(layout.gem_dir("p-1.0").join("lib/a.rb")).unwrap(),
            "# lib/a.rb\n"
        );
        assert!(layout.spec_path("p-1.0").exists());
        assert!(layout.archive_path("p-1.0").exists());
    }

    #[test]
    fn test_archive_installer_rejects_corrupt_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        let p = spec("p", "1.0").with_files(["lib/a.rb"]);
        let mut archive = build(&p);
        let last = archive.len() - 1;
        archive[last] ^= 0xff;
        let archive_path = temp_dir.path().join(p.file_name());
        fs::write(&archive_path, archive).unwrap();

        let err = ArchiveInstaller::new(layout.clone()).install(&archive_path).unwrap_err();
        assert!(matches!(err, Error::VerificationError(_)));
        assert!(!layout.gem_dir("p-1.0").exists());
    }

    /// Lists an extra entry after the real ones
    struct ExtraEntryCodec(&'static str);

    impl ArchiveCodec for ExtraEntryCodec {
        fn read_spec(&self, archive: &[u8]) -> Result<PackageSpec> {
            GemArchive.read_spec(archive)
        }

        fn list_entries(&self, archive: &[u8]) -> Result<Vec<ArchiveEntry>> {
            let mut entries = GemArchive.list_entries(archive)?;
            entries.push(ArchiveEntry::new(self.0, 0o644, "escaped\n"));
            Ok(entries)
        }

        fn build(&self, spec: &PackageSpec, entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
            GemArchive.build(spec, entries)
        }
    }

    #[test]
    fn test_archive_installer_rejects_unsafe_path_before_writing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        let p = spec("p", "1.0").with_files(["lib/ok.rb"]);
        let archive_path = temp_dir.path().join(p.file_name());
        fs::write(&archive_path, build(&p)).unwrap();

        let err = ArchiveInstaller::new(layout.clone())
            .with_codec(Box::new(ExtraEntryCodec("../evil.rb")))
            .install(&archive_path)
            .unwrap_err();
        assert!(matches!(err, Error::VerificationError(_)));
        assert!(!layout.gem_dir("p-1.0").join("lib/ok.rb").exists());
        assert!(!layout.gems_dir().join("evil.rb").exists());
        assert!(!layout.spec_path("p-1.0").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_download_local_falls_back_when_cache_is_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let layout = RepositoryLayout::new(temp_dir.path().join("root"));
        layout.ensure().unwrap();
        let a = spec("a", "1.0");
        let source_path = temp_dir.path().join(a.file_name());
        fs::write(&source_path, build(&a)).unwrap();

        let cache_dir = layout.cache_dir();
        fs::set_permissions(&cache_dir, fs::Permissions::from_mode(0o555)).unwrap();

        let fetcher = MemoryFetcher::new();
        let installer = RecordingInstaller::default();
        let context = InstallContext::new(&layout, &fetcher, &installer);
        let result = context.download(&a, &PackageSource::local(source_path.to_string_lossy()));

        fs::set_permissions(&cache_dir, fs::Permissions::from_mode(0o755)).unwrap();

        // Privileged users can write regardless of mode bits
        if layout.archive_path("a-1.0").exists() {
            return;
        }
        assert_eq!(result.unwrap(), source_path);
    }
}
