// src/repository/wire.rs

//! Index wire encodings
//!
//! A published repository exposes:
//! - `quick/index.rz`: zlib-deflated, newline-separated full names
//! - `quick/<full_name>.gemspec.bin.rz` / `.gemspec.json.rz`: one spec,
//!   binary or JSON, always deflated
//! - `specs.bin.Z`, `specs.bin`, `specs.json.Z`, `specs.json`: bulk snapshots

use crate::error::{Error, Result};
use crate::packages::spec::{Dependency, PackageSpec, Platform};
use crate::version::{Requirement, Version};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use rkyv::{Archive, Deserialize, Serialize};
use std::io::{Read, Write};

/// Path of the quick index below a repository URI
pub const QUICK_INDEX_PATH: &str = "quick/index.rz";

/// Payload encoding of a specification or snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Compact rkyv archive
    Binary,
    /// JSON
    Text,
}

impl Encoding {
    fn extension(&self) -> &'static str {
        match self {
            Encoding::Binary => "bin",
            Encoding::Text => "json",
        }
    }
}

/// One of the four bulk snapshot files, in fetch priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkEncoding {
    BinaryCompressed,
    Binary,
    TextCompressed,
    Text,
}

impl BulkEncoding {
    /// Priority order used when fetching a snapshot
    pub const ALL: [BulkEncoding; 4] = [
        BulkEncoding::BinaryCompressed,
        BulkEncoding::Binary,
        BulkEncoding::TextCompressed,
        BulkEncoding::Text,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            BulkEncoding::BinaryCompressed => "specs.bin.Z",
            BulkEncoding::Binary => "specs.bin",
            BulkEncoding::TextCompressed => "specs.json.Z",
            BulkEncoding::Text => "specs.json",
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            BulkEncoding::BinaryCompressed | BulkEncoding::Binary => Encoding::Binary,
            BulkEncoding::TextCompressed | BulkEncoding::Text => Encoding::Text,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, BulkEncoding::BinaryCompressed | BulkEncoding::TextCompressed)
    }
}

fn join_uri(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

pub fn quick_index_uri(base: &str) -> String {
    join_uri(base, QUICK_INDEX_PATH)
}

pub fn spec_uri(base: &str, full_name: &str, encoding: Encoding) -> String {
    join_uri(
        base,
        &format!("quick/{}.gemspec.{}.rz", full_name, encoding.extension()),
    )
}

pub fn bulk_uri(base: &str, encoding: BulkEncoding) -> String {
    join_uri(base, encoding.file_name())
}

/// Remote archive location for a package
pub fn archive_uri(base: &str, file_name: &str) -> String {
    join_uri(base, &format!("gems/{}", file_name))
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| Error::ParseError(format!("Failed to inflate data: {}", e)))?;
    Ok(inflated)
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
struct WireDependency {
    name: String,
    requirement: String,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
struct WireSpec {
    name: String,
    version: String,
    platform: String,
    summary: Option<String>,
    dependencies: Vec<WireDependency>,
    files: Vec<String>,
    executables: Vec<String>,
    require_paths: Vec<String>,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
struct WireIndex {
    specs: Vec<WireSpec>,
}

impl From<&PackageSpec> for WireSpec {
    fn from(spec: &PackageSpec) -> Self {
        Self {
            name: spec.name().to_string(),
            version: spec.version().to_string(),
            platform: spec.platform().to_string(),
            summary: spec.summary().map(str::to_string),
            dependencies: spec
                .dependencies()
                .iter()
                .map(|dep| WireDependency {
                    name: dep.name.clone(),
                    requirement: dep.requirement.to_string(),
                })
                .collect(),
            files: spec.files().to_vec(),
            executables: spec.executables().to_vec(),
            require_paths: spec.require_paths().to_vec(),
        }
    }
}

impl TryFrom<WireSpec> for PackageSpec {
    type Error = Error;

    fn try_from(wire: WireSpec) -> Result<Self> {
        let mut spec = PackageSpec::new(wire.name, Version::parse(&wire.version)?)
            .with_platform(Platform::parse(&wire.platform)?)
            .with_files(wire.files)
            .with_executables(wire.executables)
            .with_require_paths(wire.require_paths);

        if let Some(summary) = wire.summary {
            spec = spec.with_summary(summary);
        }
        for dep in wire.dependencies {
            spec = spec.with_dependency(Dependency::new(dep.name, Requirement::parse(&dep.requirement)?));
        }

        spec.validate()?;
        Ok(spec)
    }
}

fn encode_binary(specs: &[&PackageSpec]) -> Result<Vec<u8>> {
    let index = WireIndex {
        specs: specs.iter().map(|spec| WireSpec::from(*spec)).collect(),
    };
    let bytes = rkyv::to_bytes::<_, 1024>(&index)
        .map_err(|e| Error::ParseError(format!("Failed to encode binary index: {}", e)))?;
    Ok(bytes.to_vec())
}

fn decode_binary(data: &[u8]) -> Result<Vec<PackageSpec>> {
    // Network buffers carry no alignment guarantee
    let mut aligned = rkyv::AlignedVec::with_capacity(data.len());
    aligned.extend_from_slice(data);

    let archived = rkyv::check_archived_root::<WireIndex>(&aligned[..])
        .map_err(|e| Error::ParseError(format!("Invalid binary index: {}", e)))?;
    let index: WireIndex = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|e| Error::ParseError(format!("Failed to decode binary index: {:?}", e)))?;

    index.specs.into_iter().map(PackageSpec::try_from).collect()
}

fn encode_text(specs: &[&PackageSpec]) -> Result<Vec<u8>> {
    serde_json::to_vec(specs)
        .map_err(|e| Error::ParseError(format!("Failed to encode text index: {}", e)))
}

fn decode_text(data: &[u8]) -> Result<Vec<PackageSpec>> {
    let specs: Vec<PackageSpec> = serde_json::from_slice(data)
        .map_err(|e| Error::ParseError(format!("Invalid text index: {}", e)))?;
    for spec in &specs {
        spec.validate()?;
    }
    Ok(specs)
}

fn encode_specs(specs: &[&PackageSpec], encoding: Encoding) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Binary => encode_binary(specs),
        Encoding::Text => encode_text(specs),
    }
}

fn decode_specs(data: &[u8], encoding: Encoding) -> Result<Vec<PackageSpec>> {
    match encoding {
        Encoding::Binary => decode_binary(data),
        Encoding::Text => decode_text(data),
    }
}

/// Deflated, newline-separated list of full names
pub fn encode_quick_index<S: AsRef<str>>(full_names: &[S]) -> Result<Vec<u8>> {
    let text: Vec<&str> = full_names.iter().map(AsRef::as_ref).collect();
    deflate(text.join("\n").as_bytes())
}

pub fn decode_quick_index(data: &[u8]) -> Result<Vec<String>> {
    let inflated = inflate(data)?;
    let text = String::from_utf8(inflated)
        .map_err(|e| Error::ParseError(format!("Quick index is not UTF-8: {}", e)))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// A single deflated specification
pub fn encode_spec(spec: &PackageSpec, encoding: Encoding) -> Result<Vec<u8>> {
    deflate(&encode_specs(&[spec], encoding)?)
}

pub fn decode_spec(data: &[u8], encoding: Encoding) -> Result<PackageSpec> {
    decode_specs(&inflate(data)?, encoding)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::ParseError("Specification payload is empty".to_string()))
}

/// A full snapshot in one of the bulk encodings
pub fn encode_bulk(specs: &[&PackageSpec], encoding: BulkEncoding) -> Result<Vec<u8>> {
    let data = encode_specs(specs, encoding.encoding())?;
    if encoding.is_compressed() {
        deflate(&data)
    } else {
        Ok(data)
    }
}

pub fn decode_bulk(data: &[u8], encoding: BulkEncoding) -> Result<Vec<PackageSpec>> {
    if encoding.is_compressed() {
        decode_specs(&inflate(data)?, encoding.encoding())
    } else {
        decode_specs(data, encoding.encoding())
    }
}
