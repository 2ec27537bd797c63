// src/lib.rs

//! Gemstone package manager core
//!
//! Resolves package requests against local archives and remote
//! repositories, orders the transitive dependency set for installation, and
//! audits what ends up installed.
//!
//! # Architecture
//!
//! - Explicit indexes: every operation builds its own `RepositoryIndex`
//!   (directory scan or remote sync) and drops it afterwards
//! - Declarative specifications: spec files are JSON data, never code
//! - Incremental sync: quick index first, bulk snapshot as fallback
//! - Integrity: self-declared SHA-256 archive checksums and per-file digests

pub mod config;
mod error;
pub mod filesystem;
pub mod integrity;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
