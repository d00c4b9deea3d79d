//! The flattened accepted graph: what resolution hands to installers
//! and display layers once conflicts are settled.

use std::collections::{HashMap, HashSet};
use std::fmt;

use galleon_core::identity::LibraryIdentity;
use galleon_core::range::VersionRange;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::{Disposition, ResolutionGraph};

/// A node in the resolved dependency graph.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub identity: LibraryIdentity,
    /// The provider that supplied the winning match.
    pub provider: String,
}

impl ResolvedNode {
    /// Lowercase name, the graph's lookup key.
    pub fn key(&self) -> String {
        self.identity.name.key()
    }
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.fmt(f)
    }
}

/// Edge label: the range the parent requested.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub requested: VersionRange,
}

/// A resolved dependency graph backed by petgraph.
pub struct ResolvedGraph {
    graph: DiGraph<ResolvedNode, DependencyEdge>,
    /// Lookup from lowercase name to node index.
    index: HashMap<String, NodeIndex>,
    pub root: Option<NodeIndex>,
}

impl ResolvedGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            root: None,
        }
    }

    /// Flatten the accepted subgraph of a classified resolution tree.
    pub fn from_resolution(tree: &ResolutionGraph) -> Self {
        let mut resolved = Self::new();

        for id in tree.attached() {
            let node = tree.node(id);
            if node.disposition != Disposition::Accepted {
                continue;
            }
            if let Some(ref item) = node.item {
                let idx = resolved.add_node(ResolvedNode {
                    identity: item.key.clone(),
                    provider: item.data.provider.clone(),
                });
                if id == tree.root() {
                    resolved.root = Some(idx);
                }
            }
        }

        for id in tree.attached() {
            let node = tree.node(id);
            if node.disposition != Disposition::Accepted || node.item.is_none() {
                continue;
            }
            let from = resolved.index[&node.key.name.key()];
            for &child_id in &node.inner {
                let child = tree.node(child_id);
                if child.disposition != Disposition::Accepted || child.item.is_none() {
                    continue;
                }
                let to = resolved.index[&child.key.name.key()];
                resolved.add_edge(
                    from,
                    to,
                    DependencyEdge {
                        requested: child.key.range.clone(),
                    },
                );
            }
        }

        resolved
    }

    /// Add or retrieve a node. An existing name keeps its first entry.
    pub fn add_node(&mut self, node: ResolvedNode) -> NodeIndex {
        let key = node.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(node);
        self.index.insert(key, idx);
        idx
    }

    /// Add a dependency edge from `from` to `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DependencyEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    /// Look up a node by name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(&name.to_lowercase()).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &ResolvedNode {
        &self.graph[idx]
    }

    /// All resolved identities (excluding the root), sorted by name.
    pub fn identities(&self) -> Vec<&LibraryIdentity> {
        let mut out: Vec<&LibraryIdentity> = self
            .graph
            .node_indices()
            .filter(|&idx| Some(idx) != self.root)
            .map(|idx| &self.graph[idx].identity)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Direct dependencies of a node.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DependencyEdge)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Reverse dependencies (who depends on this node).
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DependencyEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        let total = self.graph.node_count();
        if self.root.is_some() {
            total.saturating_sub(1)
        } else {
            total
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Print the dependency tree to a string.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let root = match self.root {
            Some(root) => root,
            None => return output,
        };

        output.push_str(&format!("{}\n", self.graph[root]));

        let mut visited = HashSet::new();
        visited.insert(root);

        let deps = self.dependencies_of(root);
        let count = deps.len();
        for (i, (idx, _)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(&mut output, *idx, "", is_last, 1, max_depth, &mut visited);
        }

        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Find the path from the root to a named dependency.
    pub fn find_path(&self, name: &str) -> Option<Vec<&ResolvedNode>> {
        let root = self.root?;
        let target = self.find(name)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| &self.graph[idx]).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for edge in self.graph.edges(current) {
            if self.dfs_path(edge.target(), target, path, visited) {
                return true;
            }
        }
        path.pop();
        visited.remove(&current);
        false
    }
}

impl Default for ResolvedGraph {
    fn default() -> Self {
        Self::new()
    }
}
