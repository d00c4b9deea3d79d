//! The resolution tree: an arena of nodes with parent back-references.
//!
//! Nodes are stored in a flat vector; `outer` is a non-owning parent
//! index and `inner` the ordered child list. Detaching a node removes it
//! from its parent's child list but preserves `outer`, so diagnostics
//! can still print the path of a node that lost its place in the tree.

use std::collections::VecDeque;
use std::fmt;

use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::range::VersionRange;

/// Index of a node in its [`ResolutionGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The classifier's verdict on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acceptable,
    Accepted,
    Rejected,
    Cycle,
    PotentiallyDowngraded,
}

/// Back-reference to the lookup that produced an identity.
#[derive(Debug, Clone)]
pub struct ProviderMatch {
    pub provider: String,
    pub library: LibraryIdentity,
    pub range_used: VersionRange,
}

/// The resolved payload of a successful lookup.
#[derive(Debug, Clone)]
pub struct GraphItem {
    pub key: LibraryIdentity,
    pub data: ProviderMatch,
    pub dependencies: Vec<LibraryDependency>,
}

/// One vertex of the resolution tree.
#[derive(Debug)]
pub struct GraphNode {
    /// What was requested.
    pub key: LibraryRange,
    /// What was resolved; `None` means the lookup found nothing.
    pub item: Option<GraphItem>,
    /// Parent index. Never owns; survives detachment.
    pub outer: Option<NodeId>,
    /// Ordered child indices. The parent owns its children.
    pub inner: Vec<NodeId>,
    pub disposition: Disposition,
}

impl GraphNode {
    /// Display label: the resolved identity when there is one, the
    /// request otherwise.
    pub fn label(&self) -> String {
        match self.item {
            Some(ref item) => item.key.to_string(),
            None => self.key.to_string(),
        }
    }
}

/// The resolution tree.
pub struct ResolutionGraph {
    nodes: Vec<GraphNode>,
    root: NodeId,
}

impl ResolutionGraph {
    /// Create a graph rooted at a synthetic node for the initial target.
    pub fn new(target: LibraryRange) -> Self {
        let root = GraphNode {
            key: target,
            item: None,
            outer: None,
            inner: Vec::new(),
            disposition: Disposition::Acceptable,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id.0]
    }

    /// Append a child under `parent`.
    pub fn add_child(&mut self, parent: NodeId, key: LibraryRange) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(GraphNode {
            key,
            item: None,
            outer: Some(parent),
            inner: Vec::new(),
            disposition: Disposition::Acceptable,
        });
        self.nodes[parent.0].inner.push(id);
        id
    }

    /// Remove a node from its parent's child list. The node's `outer`
    /// back-reference is preserved for path printing.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].outer {
            self.nodes[parent.0].inner.retain(|&child| child != id);
        }
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.nodes[id.0].outer;
        std::iter::from_fn(move || {
            let next = current?;
            current = self.nodes[next.0].outer;
            Some(next)
        })
    }

    /// Distance from the root (the root itself is 0).
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Attached node ids in breadth-first order from the root.
    pub fn attached(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.nodes[id.0].inner.iter().copied());
        }
        order
    }

    /// Attached nodes that resolved to nothing.
    pub fn unresolved(&self) -> Vec<NodeId> {
        self.attached()
            .into_iter()
            .filter(|&id| {
                let node = self.node(id);
                node.item.is_none() && node.disposition != Disposition::Cycle
            })
            .collect()
    }

    /// Breadth-first traversal carrying per-branch state.
    ///
    /// The visitor receives each node together with the state its parent
    /// propagated, and returns `Some(state)` to continue into the node's
    /// children or `None` to stop the descent.
    pub fn walk_states<S, F>(&mut self, start: NodeId, seed: S, mut visit: F)
    where
        S: Clone,
        F: FnMut(&mut Self, NodeId, &S) -> Option<S>,
    {
        let mut queue = VecDeque::from([(start, seed)]);
        while let Some((id, state)) = queue.pop_front() {
            if let Some(next) = visit(self, id, &state) {
                for child in self.nodes[id.0].inner.clone() {
                    queue.push_back((child, next.clone()));
                }
            }
        }
    }

    /// The `Root -> ... -> Node` display path, following `outer`
    /// back-references. Works for detached nodes.
    pub fn path_to(&self, id: NodeId) -> String {
        let mut labels = vec![self.node(id).label()];
        for ancestor in self.ancestors(id) {
            labels.push(self.node(ancestor).label());
        }
        labels.reverse();
        labels.join(" -> ")
    }
}

impl fmt::Debug for ResolutionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionGraph")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .finish()
    }
}
