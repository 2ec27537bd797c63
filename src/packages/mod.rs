// src/packages/mod.rs

//! Package specifications and the archive format
//!
//! `PackageSpec` describes one package version. Archives are read and built
//! through the `ArchiveCodec` trait; specification files are loaded through
//! the `SpecLoader` trait.

pub mod archive;
pub mod loader;
pub mod spec;
pub mod traits;

pub use archive::GemArchive;
pub use loader::JsonSpecLoader;
pub use spec::{Dependency, PackageSpec, Platform, PlatformSet};
pub use traits::{ArchiveCodec, ArchiveEntry, SpecLoader};
