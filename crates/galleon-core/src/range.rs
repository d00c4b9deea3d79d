//! Version range parsing, membership, combination, and best-match
//! selection.
//!
//! Accepted forms:
//! - `1.2.3` — inclusive lower bound, unbounded above
//! - `[1.0,2.0)`, `(1.0,2.0]`, `[1.0,]`, `(,2.0)` — interval notation
//! - `[1.5]` — exactly `1.5`
//! - `*` — any version
//! - a trailing `-*` (e.g. `1.0.0-*`) floats the range into prerelease
//!   territory

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::version::{Version, VersionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("empty range string")]
    Empty,
    #[error("range `{0}` is missing its closing bracket")]
    Unclosed(String),
    #[error("range `{0}` has an empty interval")]
    EmptyInterval(String),
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// One endpoint of a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

/// Which satisfying version a range prefers when several are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPreference {
    /// The range names a floor; the lowest satisfying version wins.
    MinVersion,
    /// No floor; the highest satisfying version wins.
    HighestFloor,
}

/// An interval over versions with optional prerelease float behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
    pub include_prerelease: bool,
    original: Option<String>,
}

impl VersionRange {
    /// The unbounded range accepting any version.
    pub fn any() -> Self {
        Self {
            lower: None,
            upper: None,
            include_prerelease: false,
            original: Some("*".to_string()),
        }
    }

    /// A range pinned to exactly `version`.
    pub fn exact(version: Version) -> Self {
        Self {
            lower: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            upper: Some(Bound {
                version,
                inclusive: true,
            }),
            include_prerelease: false,
            original: None,
        }
    }

    /// A range with an inclusive floor and no ceiling.
    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Some(Bound {
                version,
                inclusive: true,
            }),
            upper: None,
            include_prerelease: false,
            original: None,
        }
    }

    /// Parse range text.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(RangeError::Empty);
        }
        if raw == "*" {
            return Ok(Self::any());
        }

        let (body, float) = match raw.strip_suffix("-*") {
            Some(body) => (body.trim_end(), true),
            None => (raw, false),
        };

        let mut range = if body.starts_with('[') || body.starts_with('(') {
            Self::parse_interval(body, raw)?
        } else {
            Self::at_least(Version::parse(body)?)
        };
        range.include_prerelease = float || range.bounds_are_prerelease();
        range.original = Some(raw.to_string());
        Ok(range)
    }

    fn parse_interval(body: &str, raw: &str) -> Result<Self, RangeError> {
        let open_inclusive = body.starts_with('[');
        let close_inclusive = match body.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(RangeError::Unclosed(raw.to_string())),
        };
        let inner = &body[1..body.len() - 1];
        if inner.trim().is_empty() {
            return Err(RangeError::EmptyInterval(raw.to_string()));
        }

        if let Some((lo, hi)) = inner.split_once(',') {
            let lo = lo.trim();
            let hi = hi.trim();
            Ok(Self {
                lower: if lo.is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: Version::parse(lo)?,
                        inclusive: open_inclusive,
                    })
                },
                upper: if hi.is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: Version::parse(hi)?,
                        inclusive: close_inclusive,
                    })
                },
                include_prerelease: false,
                original: None,
            })
        } else {
            Ok(Self::exact(Version::parse(inner.trim())?))
        }
    }

    fn bounds_are_prerelease(&self) -> bool {
        self.lower
            .as_ref()
            .is_some_and(|b| b.version.is_prerelease())
            || self
                .upper
                .as_ref()
                .is_some_and(|b| b.version.is_prerelease())
    }

    /// Check whether a version lies inside this range.
    ///
    /// Prerelease versions satisfy only ranges that float into prerelease
    /// territory (an explicit `-*` or a prerelease bound).
    pub fn satisfies(&self, version: &Version) -> bool {
        if version.is_prerelease() && !self.include_prerelease {
            return false;
        }
        if let Some(ref lower) = self.lower {
            let cmp = version.cmp(&lower.version);
            if lower.inclusive {
                if cmp == Ordering::Less {
                    return false;
                }
            } else if cmp != Ordering::Greater {
                return false;
            }
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if upper.inclusive {
                if cmp == Ordering::Greater {
                    return false;
                }
            } else if cmp != Ordering::Less {
                return false;
            }
        }
        true
    }

    /// The smallest range covering the union of `ranges`.
    ///
    /// Associative and idempotent. An empty input yields the any-range.
    pub fn combine<'a>(ranges: impl IntoIterator<Item = &'a VersionRange>) -> VersionRange {
        let mut iter = ranges.into_iter();
        let first = match iter.next() {
            Some(first) => first,
            None => return VersionRange::any(),
        };
        let mut lower = first.lower.clone();
        let mut upper = first.upper.clone();
        let mut float = first.include_prerelease;

        for range in iter {
            lower = match (lower, range.lower.clone()) {
                (Some(a), Some(b)) => Some(min_bound(a, b)),
                _ => None,
            };
            upper = match (upper, range.upper.clone()) {
                (Some(a), Some(b)) => Some(max_bound(a, b)),
                _ => None,
            };
            float |= range.include_prerelease;
        }

        VersionRange {
            lower,
            upper,
            include_prerelease: float,
            original: None,
        }
    }

    /// The range's floor, if it has one.
    pub fn min_version(&self) -> Option<&Version> {
        self.lower.as_ref().map(|b| &b.version)
    }

    /// Whether `version` is this range's exact target: the pinned version,
    /// or the inclusive lower bound of an open range.
    pub fn is_exact(&self, version: &Version) -> bool {
        match self.lower {
            Some(ref lower) => lower.inclusive && &lower.version == version,
            None => false,
        }
    }

    /// Whether the range pins a single version.
    pub fn is_pinned(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) => {
                lo.inclusive && hi.inclusive && lo.version == hi.version
            }
            _ => false,
        }
    }

    pub fn preference(&self) -> VersionPreference {
        match self.lower {
            Some(ref lower) if lower.inclusive => VersionPreference::MinVersion,
            _ => VersionPreference::HighestFloor,
        }
    }

    /// Whether `candidate` beats `current` under this range's preference.
    /// Both are assumed to satisfy the range.
    pub fn is_better(&self, candidate: &Version, current: &Version) -> bool {
        match self.preference() {
            VersionPreference::MinVersion => candidate < current,
            VersionPreference::HighestFloor => candidate > current,
        }
    }

    /// The range text as the caller wrote it, when parsed from text.
    pub fn original_string(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// A normalized form suitable for map keys: equal ranges produce equal
    /// strings regardless of input spelling.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        match self.lower {
            Some(ref b) => {
                out.push(if b.inclusive { '[' } else { '(' });
                out.push_str(&b.version.to_string());
            }
            None => out.push('('),
        }
        out.push_str(", ");
        match self.upper {
            Some(ref b) => {
                out.push_str(&b.version.to_string());
                out.push(if b.inclusive { ']' } else { ')' });
            }
            None => out.push(')'),
        }
        if self.include_prerelease {
            out.push_str("-*");
        }
        out
    }
}

fn min_bound(a: Bound, b: Bound) -> Bound {
    match a.version.cmp(&b.version) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => Bound {
            inclusive: a.inclusive || b.inclusive,
            version: a.version,
        },
    }
}

fn max_bound(a: Bound, b: Bound) -> Bound {
    match a.version.cmp(&b.version) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => Bound {
            inclusive: a.inclusive || b.inclusive,
            version: a.version,
        },
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref original) = self.original {
            return f.write_str(original);
        }
        if self.is_pinned() {
            if let Some(ref lower) = self.lower {
                return write!(f, "= {}", lower.version);
            }
        }
        match (&self.lower, &self.upper) {
            (None, None) => f.write_str("*"),
            (Some(lo), None) => {
                write!(f, "{} {}", if lo.inclusive { ">=" } else { ">" }, lo.version)
            }
            (None, Some(hi)) => {
                write!(f, "{} {}", if hi.inclusive { "<=" } else { "<" }, hi.version)
            }
            (Some(_), Some(_)) => f.write_str(&self.canonical_string()),
        }
    }
}

/// Select the satisfying candidate the range prefers.
///
/// `version_of` projects a candidate to its version. Ties (equal versions
/// from different candidates) keep the earliest candidate.
pub fn best_match<'a, T, F>(
    candidates: impl IntoIterator<Item = &'a T>,
    range: &VersionRange,
    version_of: F,
) -> Option<&'a T>
where
    F: Fn(&T) -> &Version,
{
    let mut best: Option<&'a T> = None;
    for candidate in candidates {
        let version = version_of(candidate);
        if !range.satisfies(version) {
            continue;
        }
        match best {
            None => best = Some(candidate),
            Some(current) if range.is_better(version, version_of(current)) => {
                best = Some(candidate);
            }
            Some(_) => {}
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn r(text: &str) -> VersionRange {
        VersionRange::parse(text).unwrap()
    }

    #[test]
    fn bare_version_is_a_floor() {
        let range = r("1.0.0");
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("2.5.0")));
        assert!(!range.satisfies(&v("0.9.0")));
        assert_eq!(range.preference(), VersionPreference::MinVersion);
    }

    #[test]
    fn interval_inclusive() {
        let range = r("[1.0, 2.0]");
        assert!(range.satisfies(&v("1.0")));
        assert!(range.satisfies(&v("2.0")));
        assert!(!range.satisfies(&v("2.0.1")));
    }

    #[test]
    fn interval_exclusive_upper() {
        let range = r("[1.0, 2.0)");
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0")));
    }

    #[test]
    fn open_lower() {
        let range = r("(, 2.0)");
        assert!(range.satisfies(&v("0.1")));
        assert!(!range.satisfies(&v("2.0")));
        assert_eq!(range.preference(), VersionPreference::HighestFloor);
    }

    #[test]
    fn pinned() {
        let range = r("[1.5]");
        assert!(range.is_pinned());
        assert!(range.satisfies(&v("1.5")));
        assert!(!range.satisfies(&v("1.5.1")));
        assert!(range.is_exact(&v("1.5")));
    }

    #[test]
    fn wildcard() {
        let range = r("*");
        assert!(range.satisfies(&v("0.0.1")));
        assert!(range.satisfies(&v("99.0")));
        assert!(range.min_version().is_none());
    }

    #[test]
    fn prerelease_gate() {
        let plain = r("1.0.0");
        assert!(!plain.satisfies(&v("1.5.0-beta")));

        let float = r("1.0.0-*");
        assert!(float.satisfies(&v("1.5.0-beta")));
        assert!(float.satisfies(&v("1.5.0")));

        let pre_bound = r("[1.0.0-rc.1, 2.0.0)");
        assert!(pre_bound.satisfies(&v("1.0.0-rc.2")));
    }

    #[test]
    fn exact_match_of_open_range_is_its_floor() {
        let range = r("1.0.0");
        assert!(range.is_exact(&v("1.0.0")));
        assert!(!range.is_exact(&v("1.1.0")));
    }

    #[test]
    fn combine_takes_the_hull() {
        let combined = VersionRange::combine([&r("[1.0, 2.0)"), &r("[1.5, 3.0]")]);
        assert!(combined.satisfies(&v("1.0")));
        assert!(combined.satisfies(&v("3.0")));
        assert!(!combined.satisfies(&v("0.9")));
        assert!(!combined.satisfies(&v("3.1")));
    }

    #[test]
    fn combine_is_associative_and_idempotent() {
        let (a, b, c) = (r("[1.0, 2.0)"), r("[1.5, 3.0]"), r("(, 1.2]"));
        let left = VersionRange::combine([&VersionRange::combine([&a, &b]), &c]);
        let right = VersionRange::combine([&a, &VersionRange::combine([&b, &c])]);
        assert_eq!(left.canonical_string(), right.canonical_string());

        let twice = VersionRange::combine([&a, &a]);
        assert_eq!(twice.canonical_string(), VersionRange::combine([&a]).canonical_string());
    }

    #[test]
    fn combine_drops_unbounded_sides() {
        let combined = VersionRange::combine([&r("1.0.0"), &r("(, 2.0)")]);
        assert!(combined.lower.is_none());
        assert!(combined.upper.is_none());
    }

    #[test]
    fn best_match_prefers_the_floor() {
        let versions = [v("1.0.0"), v("1.2.0"), v("2.0.0")];
        let best = best_match(versions.iter(), &r("1.0.0"), |x| x).unwrap();
        assert_eq!(best, &v("1.0.0"));
    }

    #[test]
    fn best_match_prefers_highest_without_floor() {
        let versions = [v("1.0.0"), v("1.2.0"), v("2.5.0")];
        let best = best_match(versions.iter(), &r("(, 2.0)"), |x| x).unwrap();
        assert_eq!(best, &v("1.2.0"));
    }

    #[test]
    fn best_match_tie_keeps_first() {
        let pairs = [("a", v("1.0.0")), ("b", v("1.0.0"))];
        let best = best_match(pairs.iter(), &r("1.0.0"), |p| &p.1).unwrap();
        assert_eq!(best.0, "a");
    }

    #[test]
    fn canonical_string_normalizes_spelling() {
        assert_eq!(r("1.0").canonical_string(), r("[1.0.0,)").canonical_string());
    }

    #[test]
    fn display_keeps_original_text() {
        assert_eq!(r("[1.0, 2.0)").to_string(), "[1.0, 2.0)");
        assert_eq!(r("1.0.0").to_string(), "1.0.0");
    }

    #[test]
    fn parse_failures() {
        assert_eq!(VersionRange::parse(""), Err(RangeError::Empty));
        assert!(matches!(
            VersionRange::parse("[1.0, 2.0"),
            Err(RangeError::Unclosed(_))
        ));
        assert!(matches!(
            VersionRange::parse("[]"),
            Err(RangeError::EmptyInterval(_))
        ));
        assert!(matches!(
            VersionRange::parse("[1.x]"),
            Err(RangeError::Version(_))
        ));
    }
}
