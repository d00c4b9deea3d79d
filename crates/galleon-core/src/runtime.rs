//! Runtime identifier graphs.
//!
//! A runtime graph maps runtime identifiers (rids) to the rids they
//! inherit from and to per-package runtime dependencies. The walker
//! consults it to augment a package's dependencies for a target runtime.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// The full rid graph, deserialized from a registry's runtime document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeGraph {
    #[serde(default)]
    pub runtimes: HashMap<String, RuntimeDescription>,
}

/// One rid: what it inherits and which packages gain extra dependencies
/// when targeting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeDescription {
    #[serde(default)]
    pub inherits: Vec<String>,
    /// Keyed by package id (case preserved as authored; lookups are
    /// case-insensitive).
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<RuntimePackageDependency>>,
}

/// An extra dependency injected when a package is used on a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePackageDependency {
    pub id: String,
    pub range: String,
}

impl RuntimeGraph {
    /// All rids reachable from `rid`, starting with `rid` itself,
    /// following `inherits` edges breadth-first, deduplicated in
    /// traversal order.
    pub fn expand_runtime(&self, rid: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([rid.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(desc) = self.runtimes.get(&current) {
                for parent in &desc.inherits {
                    queue.push_back(parent.clone());
                }
            }
            order.push(current);
        }
        order
    }

    /// Whether an asset built for `asset_rid` runs on `project_rid`.
    pub fn are_compatible(&self, project_rid: &str, asset_rid: &str) -> bool {
        self.expand_runtime(project_rid)
            .iter()
            .any(|rid| rid == asset_rid)
    }

    /// The runtime dependencies `package_id` gains on `rid`.
    ///
    /// The nearest rid in expansion order that declares an entry for the
    /// package wins; farther entries are shadowed.
    pub fn find_runtime_dependencies(
        &self,
        rid: &str,
        package_id: &str,
    ) -> Vec<RuntimePackageDependency> {
        for candidate in self.expand_runtime(rid) {
            if let Some(desc) = self.runtimes.get(&candidate) {
                for (id, deps) in &desc.dependencies {
                    if id.eq_ignore_ascii_case(package_id) {
                        return deps.clone();
                    }
                }
            }
        }
        Vec::new()
    }
}
