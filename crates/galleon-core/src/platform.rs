//! Target platforms and the nearest-compatibility oracle.
//!
//! A platform is an identifier plus a version and an optional profile,
//! written `galleon5.0` or `galleon4.5-client`. Package metadata carries
//! one dependency group per platform; the oracle picks the group nearest
//! to the project's platform.

use std::fmt;

use thiserror::Error;

use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("empty platform string")]
    Empty,
    #[error("platform `{0}` has an unparsable version")]
    InvalidVersion(String),
}

/// A target platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub identifier: String,
    pub version: Version,
    pub profile: Option<String>,
}

impl Platform {
    /// The platform compatible with everything.
    pub fn any() -> Self {
        Self {
            identifier: "any".to_string(),
            version: Version::ZERO,
            profile: None,
        }
    }

    pub fn is_any(&self) -> bool {
        self.identifier.eq_ignore_ascii_case("any")
    }

    /// Parse `identifier[version][-profile]`, e.g. `galleon5.0`,
    /// `galleon4.5-client`, `any`.
    pub fn parse(text: &str) -> Result<Self, PlatformError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlatformError::Empty);
        }

        let (body, profile) = match text.split_once('-') {
            Some((body, profile)) => (body, Some(profile.to_string())),
            None => (text, None),
        };

        let digits_at = body
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| i);
        let (identifier, version) = match digits_at {
            Some(i) => {
                let version = Version::parse(&body[i..])
                    .map_err(|_| PlatformError::InvalidVersion(text.to_string()))?;
                (body[..i].to_string(), version)
            }
            None => (body.to_string(), Version::ZERO),
        };

        Ok(Self {
            identifier,
            version,
            profile,
        })
    }

    /// Whether an asset built for `candidate` can be consumed by a project
    /// targeting `self`. Compatibility runs downward: same identifier,
    /// candidate version not above the project version. The `any` platform
    /// is compatible with everything.
    pub fn is_compatible_with(&self, candidate: &Platform) -> bool {
        if candidate.is_any() || self.is_any() {
            return true;
        }
        self.identifier.eq_ignore_ascii_case(&candidate.identifier)
            && candidate.version <= self.version
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)?;
        if !self.version.is_zero() {
            write!(f, "{}", self.version)?;
        }
        if let Some(ref profile) = self.profile {
            write!(f, "-{profile}")?;
        }
        Ok(())
    }
}

/// Pick the candidate platform nearest to `project`.
///
/// Tie-breaks, in order: an exact match wins outright; otherwise, among
/// compatible candidates, a matching profile beats no profile, which beats
/// a differing profile; then the highest candidate version wins; remaining
/// ties keep the earliest candidate.
pub fn get_nearest<'a>(
    project: &Platform,
    candidates: impl IntoIterator<Item = &'a Platform>,
) -> Option<&'a Platform> {
    let mut best: Option<(&'a Platform, u8)> = None;
    for candidate in candidates {
        if candidate == project {
            return Some(candidate);
        }
        if !project.is_compatible_with(candidate) {
            continue;
        }
        let rank = profile_rank(project, candidate);
        let better = match best {
            None => true,
            Some((current, current_rank)) => {
                rank < current_rank
                    || (rank == current_rank && candidate.version > current.version)
            }
        };
        if better {
            best = Some((candidate, rank));
        }
    }
    best.map(|(platform, _)| platform)
}

fn profile_rank(project: &Platform, candidate: &Platform) -> u8 {
    match (&project.profile, &candidate.profile) {
        (Some(p), Some(c)) if p.eq_ignore_ascii_case(c) => 0,
        (_, None) => 1,
        _ => 2,
    }
}
