// src/version.rs

//! Version and requirement model
//!
//! Versions are dotted sequences of non-negative integers compared segment by
//! segment, with the shorter side zero-padded. Requirements are conjunctions of
//! `(operator, version)` terms such as `">= 1.0, < 2.0"` or `"~> 1.2"`.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A comparable package version
#[derive(Debug, Clone)]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    /// Create a version from its segments
    pub fn new(segments: Vec<u64>) -> Self {
        let segments = if segments.is_empty() { vec![0] } else { segments };
        Self { segments }
    }

    /// Parse a dotted version string such as `1.2.0`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::ParseError("empty version string".to_string()));
        }

        let segments = text
            .split('.')
            .map(|segment| {
                segment.parse::<u64>().map_err(|_| {
                    Error::ParseError(format!("Malformed version number string {}", text))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// The exclusive upper bound used by the pessimistic operator.
    ///
    /// Drops the least significant segment (when there is more than one) and
    /// increments the new last segment: `1.2.3` bumps to `1.3`, `1` to `2`.
    /// Returns `None` when that segment is already `u64::MAX`, meaning there
    /// is no upper bound.
    pub fn bump(&self) -> Option<Self> {
        let mut segments = self.segments.clone();
        if segments.len() > 1 {
            segments.pop();
        }
        if let Some(last) = segments.last_mut() {
            *last = last.checked_add(1)?;
        }
        Some(Self { segments })
    }

    /// Segments with trailing zeros removed, so `1.0` and `1` hash alike
    fn significant(&self) -> &[u64] {
        let end = self
            .segments
            .iter()
            .rposition(|s| *s != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..end]
    }
}

/// Three-way comparison returning -1, 0 or 1
pub fn compare(a: &Version, b: &Version) -> i32 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", text.join("."))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Comparison operator in a requirement term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    NotEq,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    /// `~>`: at least the given version, below its next significant release
    Pessimistic,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "!=",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Pessimistic => "~>",
        }
    }

    /// Evaluate `candidate <op> bound`
    pub fn holds(&self, candidate: &Version, bound: &Version) -> bool {
        match self {
            Op::Eq => candidate == bound,
            Op::NotEq => candidate != bound,
            Op::Greater => candidate > bound,
            Op::GreaterEq => candidate >= bound,
            Op::Less => candidate < bound,
            Op::LessEq => candidate <= bound,
            Op::Pessimistic => candidate >= bound && bound.bump().is_none_or(|upper| *candidate < upper),
        }
    }
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Op::Eq),
            "!=" => Ok(Op::NotEq),
            ">" => Ok(Op::Greater),
            ">=" => Ok(Op::GreaterEq),
            "<" => Ok(Op::Less),
            "<=" => Ok(Op::LessEq),
            "~>" => Ok(Op::Pessimistic),
            _ => Err(Error::ParseError(format!("Unknown requirement operator: {}", s))),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conjunction of version constraints
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    constraints: Vec<(Op, Version)>,
}

impl Requirement {
    /// Build a requirement from explicit terms. An empty list matches everything.
    pub fn new(constraints: Vec<(Op, Version)>) -> Self {
        Self { constraints }
    }

    /// A requirement with no terms; satisfied by every version
    pub fn any() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Single `op version` term
    pub fn single(op: Op, version: Version) -> Self {
        Self {
            constraints: vec![(op, version)],
        }
    }

    /// Parse `">= 1.0, < 2"`; a bare version means `=`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }

        let constraints = text
            .split(',')
            .map(Self::parse_term)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { constraints })
    }

    fn parse_term(term: &str) -> Result<(Op, Version)> {
        let term = term.trim();
        let split = term
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| Error::ParseError(format!("Illformed requirement [{:?}]", term)))?;

        let (op_text, version_text) = term.split_at(split);
        let op_text = op_text.trim();
        let op = if op_text.is_empty() {
            Op::Eq
        } else {
            op_text.parse()?
        };

        Ok((op, Version::parse(version_text)?))
    }

    pub fn constraints(&self) -> &[(Op, Version)] {
        &self.constraints
    }

    /// True iff every term holds for `version`
    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.constraints
            .iter()
            .all(|(op, bound)| op.holds(version, bound))
    }
}

impl Default for Requirement {
    /// `>= 0`, which every version satisfies
    fn default() -> Self {
        Self::single(Op::GreaterEq, Version::new(vec![0]))
    }
}

impl FromStr for Requirement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return f.write_str(">= 0");
        }
        let terms: Vec<String> = self
            .constraints
            .iter()
            .map(|(op, version)| format!("{} {}", op, version))
            .collect();
        f.write_str(&terms.join(", "))
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Requirement::parse(&text).map_err(serde::de::Error::custom)
    }
}
