//! Four-part version parsing and comparison.
//!
//! Galleon versions are `major.minor.patch.revision` with an optional
//! prerelease tag sequence and optional build metadata:
//! - Missing numeric parts default to zero, so `1.0` equals `1.0.0.0`
//! - Prerelease versions sort before their release equivalent
//! - Prerelease tags compare per semver: numeric tags as numbers, mixed
//!   tags lexically, numeric below alphanumeric
//! - Build metadata (`+sha`) is ignored by ordering and equality

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

/// Error produced when version text cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("version `{0}` has more than four numeric parts")]
    TooManyParts(String),
    #[error("version `{0}` has a non-numeric part")]
    InvalidNumber(String),
    #[error("version `{0}` has an empty prerelease tag")]
    EmptyTag(String),
}

/// A parsed four-part version.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    release: Vec<String>,
    metadata: Option<String>,
}

impl Version {
    /// The `0.0.0.0` sentinel meaning "any version".
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
        revision: 0,
        release: Vec::new(),
        metadata: None,
    };

    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release: Vec::new(),
            metadata: None,
        }
    }

    /// Parse version text, e.g. `1.2.3`, `1.2.3.4`, `2.0.0-beta.1+build5`.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let (rest, metadata) = match text.split_once('+') {
            Some((rest, meta)) => (rest, Some(meta.to_string())),
            None => (text, None),
        };
        let (numbers, release) = match rest.split_once('-') {
            Some((numbers, tags)) => {
                let tags: Vec<String> = tags.split('.').map(str::to_string).collect();
                if tags.iter().any(String::is_empty) {
                    return Err(VersionError::EmptyTag(text.to_string()));
                }
                (numbers, tags)
            }
            None => (rest, Vec::new()),
        };

        let mut parts = [0u64; 4];
        let mut count = 0;
        for piece in numbers.split('.') {
            if count == 4 {
                return Err(VersionError::TooManyParts(text.to_string()));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| VersionError::InvalidNumber(text.to_string()))?;
            count += 1;
        }
        if count == 0 {
            return Err(VersionError::Empty);
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            revision: parts[3],
            release,
            metadata,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self == &Version::ZERO
    }

    /// The prerelease tag sequence, empty for release versions.
    pub fn release_tags(&self) -> &[String] {
        &self.release
    }

    pub fn with_release_tags(mut self, tags: &[&str]) -> Self {
        self.release = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if !self.release.is_empty() {
            write!(f, "-{}", self.release.join("."))?;
        }
        if let Some(ref meta) = self.metadata {
            write!(f, "+{meta}")?;
        }
        Ok(())
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
        (self.major, self.minor, self.patch, self.revision).hash(state);
        self.release.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let numeric = (self.major, self.minor, self.patch, self.revision).cmp(&(
            other.major,
            other.minor,
            other.patch,
            other.revision,
        ));
        if numeric != Ordering::Equal {
            return numeric;
        }
        compare_release(&self.release, &other.release)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_release(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    for i in 0..a.len().max(b.len()) {
        match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => {
                let ord = compare_tag(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            // A longer tag sequence sorts above its prefix.
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => unreachable!(),
        }
    }
    Ordering::Equal
}

fn compare_tag(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}
