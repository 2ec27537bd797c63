// tests/integration_test.rs

//! Integration tests for Gemstone
//!
//! These tests verify end-to-end functionality across modules.

use gemstone::Error;
use gemstone::filesystem::RepositoryLayout;
use gemstone::integrity::{Problem, audit_repository, verify_archive_file};
use gemstone::packages::{ArchiveCodec, ArchiveEntry, Dependency, GemArchive, PackageSpec};
use gemstone::repository::wire::{self, BulkEncoding, Encoding};
use gemstone::repository::{FileFetcher, MemoryFetcher, RemoteSource, RepositoryIndex};
use gemstone::resolver::install::InstallContext;
use gemstone::resolver::{ArchiveInstaller, Domain, Installer, Resolver};
use gemstone::version::{Requirement, Version};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const REMOTE: &str = "http://gems.example.com";

fn spec(name: &str, version: &str) -> PackageSpec {
    PackageSpec::new(name, Version::parse(version).unwrap())
}

fn dep(name: &str, requirement: &str) -> Dependency {
    Dependency::parse(name, requirement).unwrap()
}

/// Build an archive whose files contain their own path
fn build_archive(spec: &PackageSpec) -> Vec<u8> {
    let entries: Vec<ArchiveEntry> = spec
        .files()
        .iter()
        .map(|path| ArchiveEntry::new(path.clone(), 0o644, format!("# {}\n", path)))
        .collect();
    GemArchive.build(spec, &entries).unwrap()
}

fn write_archive(dir: &Path, spec: &PackageSpec) -> PathBuf {
    let path = dir.join(spec.file_name());
    fs::write(&path, build_archive(spec)).unwrap();
    path
}

#[test]
fn test_resolve_and_install_local_packages() {
    let work_dir = tempfile::tempdir().unwrap();
    let root_dir = tempfile::tempdir().unwrap();

    let foo = spec("foo", "1.0")
        .with_dependency(dep("bar", "> 0.9"))
        .with_files(["lib/foo.rb"]);
    let bar = spec("bar", "1.0").with_files(["lib/bar.rb"]);
    write_archive(work_dir.path(), &foo);
    write_archive(work_dir.path(), &bar);

    let resolver = Resolver::new(work_dir.path(), Vec::new()).with_domain(Domain::Local);
    let plan = resolver.resolve(&dep("foo", ">= 1.0"), false).unwrap();
    assert_eq!(plan.full_names(), ["bar-1.0", "foo-1.0"]);
    assert!(plan.iter().all(|c| c.source.is_local()));

    let layout = RepositoryLayout::new(root_dir.path());
    let installer = ArchiveInstaller::new(layout.clone());
    let fetcher = MemoryFetcher::new();
    let context = InstallContext::new(&layout, &fetcher, &installer);

    let installed = context.install_plan(&plan, &HashSet::new()).unwrap();
    assert_eq!(installed.len(), 2);
    assert!(layout.gem_dir("foo-1.0").join("lib/foo.rb").is_file());
    assert!(layout.gem_dir("bar-1.0").join("lib/bar.rb").is_file());

    let index = RepositoryIndex::from_installed(&layout);
    assert_eq!(index.len(), 2);
    assert_eq!(index.find_name("bar", &Requirement::default())[0].full_name(), "bar-1.0");
    assert!(audit_repository(&index, &layout, &GemArchive).is_clean());
}

#[test]
fn test_resolve_remote_dependencies_through_sync() {
    let work_dir = tempfile::tempdir().unwrap();
    let root_dir = tempfile::tempdir().unwrap();

    let foo = spec("foo", "2.0").with_dependency(dep("bar", "~> 1.0"));
    let bar_old = spec("bar", "0.5");
    let bar = spec("bar", "1.3");
    let published = [&foo, &bar_old, &bar];

    let mut fetcher = MemoryFetcher::new();
    fetcher.insert(
        wire::bulk_uri(REMOTE, BulkEncoding::BinaryCompressed),
        wire::encode_bulk(&published, BulkEncoding::BinaryCompressed).unwrap(),
    );
    for spec in published {
        fetcher.insert(wire::archive_uri(REMOTE, &spec.file_name()), build_archive(spec));
    }

    let mut source = RemoteSource::new(REMOTE);
    source.refresh(&fetcher, 500).unwrap();
    assert_eq!(source.index.len(), 3);

    let resolver = Resolver::new(work_dir.path(), vec![source]);
    let plan = resolver.resolve(&dep("foo", ""), false).unwrap();
    assert_eq!(plan.full_names(), ["bar-1.3", "foo-2.0"]);

    let layout = RepositoryLayout::new(root_dir.path());
    let installer = ArchiveInstaller::new(layout.clone());
    let context = InstallContext::new(&layout, &fetcher, &installer);
    context.install_plan(&plan, &HashSet::new()).unwrap();

    assert!(layout.archive_path("bar-1.3").is_file());
    assert!(layout.spec_path("foo-2.0").is_file());
    assert!(!layout.spec_path("bar-0.5").exists());
}

#[test]
fn test_candidate_ranking() {
    let work_dir = tempfile::tempdir().unwrap();
    write_archive(work_dir.path(), &spec("a", "1.0"));

    let index: RepositoryIndex = [spec("a", "1.0")].into_iter().collect();
    let resolver = Resolver::new(work_dir.path(), vec![RemoteSource::with_index(REMOTE, index)]);
    let candidates = resolver.find_candidates(&dep("a", ""));
    assert!(candidates.last().unwrap().source.is_local());

    let index: RepositoryIndex = [spec("a", "1.0"), spec("a", "2.0")].into_iter().collect();
    let empty_dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(empty_dir.path(), vec![RemoteSource::with_index(REMOTE, index)]);
    let candidates = resolver.find_candidates(&dep("a", ""));
    assert_eq!(candidates.last().unwrap().spec.full_name(), "a-2.0");
}

#[test]
fn test_search_add_remove() {
    let mut index = RepositoryIndex::new();
    for (name, version) in [("rake", "0.7.1"), ("rake", "0.8"), ("rails", "1.2")] {
        let spec = spec(name, version);
        let requirement = Requirement::parse(&format!("= {}", version)).unwrap();

        index.add_spec(spec.clone());
        let found = index.find_name(name, &requirement);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], &spec);
    }

    assert!(index.remove_spec("rake-0.8").is_some());
    assert!(index.find_name("rake", &Requirement::parse("= 0.8").unwrap()).is_empty());
    assert_eq!(index.find_name("rake", &Requirement::default()).len(), 1);
}

fn quick_mirror(names: &[&str]) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    fetcher.insert(wire::quick_index_uri(REMOTE), wire::encode_quick_index(names).unwrap());
    fetcher
}

#[test]
fn test_incremental_sync() {
    let mut fetcher = quick_mirror(&["x-1.0", "y-2.0"]);
    let x = spec("x", "1.0");
    fetcher.insert(
        wire::spec_uri(REMOTE, "x-1.0", Encoding::Binary),
        wire::encode_spec(&x, Encoding::Binary).unwrap(),
    );

    let local_y = spec("y", "2.0").with_summary("kept from before");
    let mut index: RepositoryIndex = [local_y, spec("z", "3.0")].into_iter().collect();

    index.update(REMOTE, &fetcher, 500).unwrap();

    assert!(!index.contains("z-3.0"));
    assert!(index.contains("x-1.0"));
    assert_eq!(index.specification("y-2.0").unwrap().summary(), Some("kept from before"));
    assert_eq!(index.len(), 2);
    assert!(
        !fetcher
            .requests()
            .iter()
            .any(|uri| uri.contains("specs."))
    );
}

#[test]
fn test_bulk_sync_over_threshold() {
    let mut fetcher = quick_mirror(&["x-1.0", "y-2.0", "w-5.0"]);
    let snapshot = [spec("x", "1.0"), spec("y", "2.0"), spec("w", "5.0")];
    let refs: Vec<&PackageSpec> = snapshot.iter().collect();
    fetcher.insert(
        wire::bulk_uri(REMOTE, BulkEncoding::Text),
        wire::encode_bulk(&refs, BulkEncoding::Text).unwrap(),
    );

    let local_y = spec("y", "2.0").with_summary("replaced");
    let mut index: RepositoryIndex = [local_y, spec("z", "3.0")].into_iter().collect();

    index.update(REMOTE, &fetcher, 1).unwrap();

    assert_eq!(index.len(), 3);
    assert!(!index.contains("z-3.0"));
    assert_eq!(index.specification("y-2.0").unwrap().summary(), None);
    assert!(fetcher.requests().contains(&wire::bulk_uri(REMOTE, BulkEncoding::Text)));
    assert!(
        !fetcher
            .requests()
            .iter()
            .any(|uri| uri.contains(".gemspec."))
    );
}

#[test]
fn test_sync_from_mirror_on_disk() {
    let mirror = tempfile::tempdir().unwrap();
    let a = spec("a", "1.0");
    fs::create_dir_all(mirror.path().join("quick")).unwrap();
    fs::write(mirror.path().join("quick/index.rz"), wire::encode_quick_index(&["a-1.0"]).unwrap()).unwrap();
    fs::write(
        mirror.path().join("quick/a-1.0.gemspec.json.rz"),
        wire::encode_spec(&a, Encoding::Text).unwrap(),
    )
    .unwrap();

    let uri = mirror.path().to_str().unwrap().to_string();
    let mut index = RepositoryIndex::new();
    index.update(&uri, &FileFetcher, 500).unwrap();
    assert!(index.contains("a-1.0"));
}

#[test]
fn test_audit_detects_drift() {
    let work_dir = tempfile::tempdir().unwrap();
    let root_dir = tempfile::tempdir().unwrap();
    let layout = RepositoryLayout::new(root_dir.path());

    let p = spec("p", "1.0").with_files(["lib/a.rb"]);
    let archive = write_archive(work_dir.path(), &p);
    verify_archive_file(&archive).unwrap();
    ArchiveInstaller::new(layout.clone()).install(&archive).unwrap();

    let gem_dir = layout.gem_dir("p-1.0");
    fs::write(gem_dir.join("lib/a.rb"), "tampered\n").unwrap();
    fs::write(gem_dir.join("lib/b.rb"), "untracked\n").unwrap();

    let index = RepositoryIndex::from_installed(&layout);
    let report = audit_repository(&index, &layout, &GemArchive);
    let findings = report.findings("p-1.0").unwrap();

    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].path, "lib/a.rb");
    assert_eq!(findings[0].problem, Problem::ContentMismatch);
    assert_eq!(findings[1].path, "lib/b.rb");
    assert_eq!(findings[1].problem, Problem::UnmanagedFile);
}

#[test]
fn test_installing_corrupt_download_fails() {
    let root_dir = tempfile::tempdir().unwrap();
    let layout = RepositoryLayout::new(root_dir.path());
    let foo = spec("foo", "1.0").with_files(["lib/foo.rb"]);

    let mut corrupt = build_archive(&foo);
    corrupt.truncate(corrupt.len() - 8);

    let mut fetcher = MemoryFetcher::new();
    fetcher.insert(
        wire::bulk_uri(REMOTE, BulkEncoding::Binary),
        wire::encode_bulk(&[&foo], BulkEncoding::Binary).unwrap(),
    );
    fetcher.insert(wire::archive_uri(REMOTE, &foo.file_name()), corrupt);

    let mut source = RemoteSource::new(REMOTE);
    source.refresh(&fetcher, 500).unwrap();
    let work_dir = tempfile::tempdir().unwrap();
    let plan = Resolver::new(work_dir.path(), vec![source])
        .resolve(&dep("foo", ""), false)
        .unwrap();

    let installer = ArchiveInstaller::new(layout.clone());
    let context = InstallContext::new(&layout, &fetcher, &installer);
    let err = context.install_plan(&plan, &HashSet::new()).unwrap_err();
    assert!(matches!(err, Error::VerificationError(_)));
    assert!(!layout.spec_path("foo-1.0").exists());
}
