//! Package names, identities, and requested ranges.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::range::VersionRange;
use crate::version::Version;

/// A package name: stored as given, compared and hashed
/// case-insensitively. Used at every map and set boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercase form used as a map key.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PackageName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageName {}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            byte.to_ascii_lowercase().hash(state);
        }
    }
}

impl Ord for PackageName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .bytes()
            .map(|b| b.to_ascii_lowercase())
            .cmp(other.0.bytes().map(|b| b.to_ascii_lowercase()))
    }
}

impl PartialOrd for PackageName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What kind of library an identity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Package,
    Project,
    Reference,
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryKind::Package => f.write_str("package"),
            LibraryKind::Project => f.write_str("project"),
            LibraryKind::Reference => f.write_str("reference"),
        }
    }
}

/// A concrete resolved library: name, exact version, kind.
///
/// Two identities are equal iff all three fields match; the name compares
/// case-insensitively, the version exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryIdentity {
    pub name: PackageName,
    pub version: Version,
    pub kind: LibraryKind,
}

impl LibraryIdentity {
    pub fn package(name: impl Into<PackageName>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            kind: LibraryKind::Package,
        }
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A requested library: name, acceptable version range, and an optional
/// restriction on the kind of library that may satisfy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRange {
    pub name: PackageName,
    pub range: VersionRange,
    pub kind: Option<LibraryKind>,
}

impl LibraryRange {
    pub fn new(name: impl Into<PackageName>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: LibraryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Whether `identity` satisfies this request.
    pub fn matches(&self, identity: &LibraryIdentity) -> bool {
        self.name == identity.name
            && self.kind.is_none_or(|kind| kind == identity.kind)
            && self.range.satisfies(&identity.version)
    }
}

impl fmt::Display for LibraryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.range)
    }
}
