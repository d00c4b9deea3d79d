//! Dependency edges: a requested range plus propagation policy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::LibraryRange;

/// How far a dependency's transitive surface is exposed to consumers of
/// the declaring package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressParent {
    /// The dependency flows through to parents normally.
    #[default]
    None,
    /// The dependency is private to the declaring package.
    All,
}

/// Which assets of a dependency the declaring package consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeFlags {
    pub runtime: bool,
    pub compile: bool,
    pub build: bool,
}

impl IncludeFlags {
    pub fn all() -> Self {
        Self {
            runtime: true,
            compile: true,
            build: true,
        }
    }

    pub fn none() -> Self {
        Self {
            runtime: false,
            compile: false,
            build: false,
        }
    }
}

impl Default for IncludeFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// A single dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDependency {
    pub library_range: LibraryRange,
    pub suppress_parent: SuppressParent,
    pub include: IncludeFlags,
    /// Optional dependencies may go unresolved without failing the walk.
    pub optional: bool,
}

impl LibraryDependency {
    pub fn new(library_range: LibraryRange) -> Self {
        Self {
            library_range,
            suppress_parent: SuppressParent::None,
            include: IncludeFlags::all(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.suppress_parent = SuppressParent::All;
        self
    }

    /// Whether the edge is visible to consumers of the declaring package.
    pub fn is_transitive(&self) -> bool {
        self.suppress_parent == SuppressParent::None
    }
}

impl fmt::Display for LibraryDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.library_range.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::VersionRange;

    #[test]
    fn defaults() {
        let dep = LibraryDependency::new(LibraryRange::new(
            "lib",
            VersionRange::parse("1.0.0").unwrap(),
        ));
        assert!(dep.is_transitive());
        assert!(!dep.optional);
        assert_eq!(dep.include, IncludeFlags::all());
    }

    #[test]
    fn private_edges_do_not_flow() {
        let dep = LibraryDependency::new(LibraryRange::new(
            "lib",
            VersionRange::parse("1.0.0").unwrap(),
        ))
        .private();
        assert!(!dep.is_transitive());
    }
}
