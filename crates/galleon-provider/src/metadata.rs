//! Registry metadata documents: per-package version listings with
//! per-platform dependency groups.

use galleon_core::dependency::{LibraryDependency, SuppressParent};
use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::platform::{self, Platform};
use galleon_core::range::{best_match, VersionRange};
use galleon_core::version::Version;
use galleon_util::errors::{GalleonError, GalleonResult};
use serde::{Deserialize, Serialize};

/// The registry document for one package id, listing every published
/// version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,
    #[serde(default)]
    pub entries: Vec<VersionEntry>,
}

/// One published version of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default = "default_listed")]
    pub listed: bool,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

fn default_listed() -> bool {
    true
}

/// The dependencies a version declares for one target platform. A group
/// without a platform is the universal fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGroup {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

/// A declared dependency inside a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub id: String,
    pub range: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub suppress_parent: SuppressParent,
}

impl PackageMetadata {
    pub fn parse(bytes: &[u8]) -> GalleonResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            GalleonError::Parse {
                message: format!("Malformed registry metadata: {e}"),
            }
            .into()
        })
    }

    /// Select the identity this document offers for a request.
    ///
    /// Unlisted versions are only eligible when the request pins them
    /// exactly. Entries with unparsable versions are skipped.
    pub fn find_best(&self, request: &LibraryRange) -> Option<(LibraryIdentity, &VersionEntry)> {
        let candidates: Vec<(Version, &VersionEntry)> = self
            .entries
            .iter()
            .filter_map(|entry| match Version::parse(&entry.version) {
                Ok(version) => Some((version, entry)),
                Err(e) => {
                    tracing::warn!(
                        "Skipping unparsable version `{}` of {}: {e}",
                        entry.version,
                        self.id
                    );
                    None
                }
            })
            .filter(|(_, entry)| entry.listed || request.range.is_pinned())
            .collect();

        best_match(candidates.iter(), &request.range, |(version, _)| version).map(
            |(version, entry)| {
                let mut identity = LibraryIdentity::package(self.id.as_str(), version.clone());
                if let Some(kind) = request.kind {
                    identity.kind = kind;
                }
                (identity, *entry)
            },
        )
    }

    /// Find the entry for an exact version.
    pub fn entry_for(&self, version: &Version) -> Option<&VersionEntry> {
        self.entries
            .iter()
            .find(|entry| Version::parse(&entry.version).as_ref() == Ok(version))
    }
}

impl VersionEntry {
    /// The dependencies of this version for a project platform: the
    /// nearest platform-specific group, falling back to the universal
    /// group.
    pub fn dependencies_for(&self, project: &Platform) -> GalleonResult<Vec<LibraryDependency>> {
        let mut parsed: Vec<(Platform, &DependencyGroup)> = Vec::with_capacity(
            self.dependency_groups.len(),
        );
        for group in &self.dependency_groups {
            let platform = match group.platform {
                Some(ref text) => Platform::parse(text).map_err(|e| GalleonError::Parse {
                    message: format!("Bad platform in dependency group: {e}"),
                })?,
                None => Platform::any(),
            };
            parsed.push((platform, group));
        }

        let nearest = platform::get_nearest(project, parsed.iter().map(|(p, _)| p));
        let group = match nearest {
            Some(found) => {
                parsed
                    .iter()
                    .find(|(p, _)| p == found)
                    .map(|(_, group)| *group)
            }
            None => None,
        };

        let Some(group) = group else {
            return Ok(Vec::new());
        };

        group
            .dependencies
            .iter()
            .map(|spec| {
                let range = VersionRange::parse(&spec.range).map_err(|e| GalleonError::Parse {
                    message: format!("Bad range `{}` for dependency {}: {e}", spec.range, spec.id),
                })?;
                let mut dep =
                    LibraryDependency::new(LibraryRange::new(spec.id.as_str(), range));
                dep.optional = spec.optional;
                dep.suppress_parent = spec.suppress_parent;
                Ok(dep)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> PackageMetadata {
        PackageMetadata::parse(
            br#"{
                "id": "Lib.Core",
                "entries": [
                    { "version": "1.0.0" },
                    { "version": "1.2.0",
                      "dependency_groups": [
                        { "platform": "galleon4.0",
                          "dependencies": [ { "id": "Old.Dep", "range": "1.0.0" } ] },
                        { "platform": "galleon5.0",
                          "dependencies": [ { "id": "New.Dep", "range": "2.0.0" } ] },
                        { "dependencies": [ { "id": "Any.Dep", "range": "1.0.0" } ] }
                      ] },
                    { "version": "2.0.0", "listed": false },
                    { "version": "2.1.0-beta.1" }
                ]
            }"#,
        )
        .unwrap()
    }

    fn request(range: &str) -> LibraryRange {
        LibraryRange::new("Lib.Core", VersionRange::parse(range).unwrap())
    }

    fn platform(text: &str) -> Platform {
        Platform::parse(text).unwrap()
    }

    #[test]
    fn floor_request_selects_lowest_listed() {
        let (identity, _) = doc().find_best(&request("1.0.0")).unwrap();
        assert_eq!(identity.version, Version::parse("1.0.0").unwrap());
    }

    #[test]
    fn unlisted_needs_an_exact_pin() {
        let doc = doc();
        assert!(doc.find_best(&request("[1.9, 3.0)")).is_none());
        let (identity, _) = doc.find_best(&request("[2.0.0]")).unwrap();
        assert_eq!(identity.version, Version::parse("2.0.0").unwrap());
    }

    #[test]
    fn prerelease_needs_a_floating_request() {
        let doc = doc();
        assert!(doc.find_best(&request("[2.1, 3.0)")).is_none());
        let (identity, _) = doc.find_best(&request("2.1.0-*")).unwrap();
        assert_eq!(identity.version, Version::parse("2.1.0-beta.1").unwrap());
    }

    #[test]
    fn nearest_dependency_group_wins() {
        let doc = doc();
        let entry = doc.entry_for(&Version::parse("1.2.0").unwrap()).unwrap();

        let deps = entry.dependencies_for(&platform("galleon5.0")).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].library_range.name.as_str(), "New.Dep");

        let deps = entry.dependencies_for(&platform("galleon4.5")).unwrap();
        assert_eq!(deps[0].library_range.name.as_str(), "Old.Dep");

        // Nothing platform-specific fits: universal group applies.
        let deps = entry.dependencies_for(&platform("steel1.0")).unwrap();
        assert_eq!(deps[0].library_range.name.as_str(), "Any.Dep");
    }

    #[test]
    fn version_without_groups_has_no_dependencies() {
        let doc = doc();
        let entry = doc.entry_for(&Version::parse("1.0.0").unwrap()).unwrap();
        assert!(entry
            .dependencies_for(&platform("galleon5.0"))
            .unwrap()
            .is_empty());
    }
}
