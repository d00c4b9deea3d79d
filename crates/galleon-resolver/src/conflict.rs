//! Graph conflict resolution: the cycle/downgrade pass and the
//! nearest-wins classification fixpoint.

use std::collections::HashMap;
use std::fmt;

use galleon_core::identity::{LibraryIdentity, LibraryKind};
use galleon_util::errors::{GalleonError, GalleonResult};

use crate::graph::{Disposition, GraphItem, NodeId, ResolutionGraph};

/// Iteration budget for the classification fixpoint.
const PATIENCE: usize = 1000;

/// A dependency cycle, detached from the tree and reported.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub node: NodeId,
    pub path: String,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cycle detected: {}", self.path)
    }
}

/// A detected downgrade: a node whose requested floor is below what a
/// nearer request pinned for the same name.
#[derive(Debug, Clone)]
pub struct DowngradeReport {
    pub node: NodeId,
    pub downgraded_by: NodeId,
    pub path: String,
    pub winning_path: String,
}

impl fmt::Display for DowngradeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detected package downgrade: {} overrides {}",
            self.winning_path, self.path
        )
    }
}

/// The outcome of the cycle and downgrade pass.
#[derive(Debug, Default)]
pub struct GraphAnalysis {
    pub cycles: Vec<CycleReport>,
    pub downgrades: Vec<DowngradeReport>,
}

/// Detach cycles and downgrades from the tree in a single
/// breadth-first pass. Both are reported, not errors.
pub fn check_cycle_and_nearest_wins(graph: &mut ResolutionGraph) -> GraphAnalysis {
    let mut analysis = GraphAnalysis::default();
    let mut cycles = Vec::new();
    let mut downgrade_candidates = Vec::new();

    for id in graph.attached() {
        match graph.node(id).disposition {
            Disposition::Cycle => cycles.push(id),
            Disposition::PotentiallyDowngraded => downgrade_candidates.push(id),
            _ => {}
        }
    }

    for id in cycles {
        analysis.cycles.push(CycleReport {
            node: id,
            path: graph.path_to(id),
        });
        graph.detach(id);
    }

    for id in downgrade_candidates {
        match find_downgrade_winner(graph, id) {
            Some(winner) => {
                analysis.downgrades.push(DowngradeReport {
                    node: id,
                    downgraded_by: winner,
                    path: graph.path_to(id),
                    winning_path: graph.path_to(winner),
                });
                graph.detach(id);
            }
            // The nearer request disappeared (its subtree was detached);
            // hand the node back to the classifier.
            None => graph.node_mut(id).disposition = Disposition::Acceptable,
        }
    }

    analysis
}

/// The sibling-of-an-ancestor that wins over a potentially downgraded
/// node: same name, different key, strictly lower floor at a higher
/// level of the tree.
fn find_downgrade_winner(graph: &ResolutionGraph, id: NodeId) -> Option<NodeId> {
    let key = &graph.node(id).key;
    let own_min = key.range.min_version()?;

    let mut on_path = id;
    for ancestor in graph.ancestors(id) {
        for &cousin in &graph.node(ancestor).inner {
            if cousin == on_path {
                continue;
            }
            let cousin_key = &graph.node(cousin).key;
            if cousin_key.name == key.name
                && cousin_key != key
                && cousin_key
                    .range
                    .min_version()
                    .is_some_and(|other| other < own_min)
            {
                return Some(cousin);
            }
        }
        on_path = ancestor;
    }
    None
}

/// Per-branch state for the ambiguity pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Walking,
    Rejected,
    Ambiguous,
}

#[derive(Debug)]
struct TrackedItem {
    identity: LibraryIdentity,
    depth: usize,
    ambiguous: bool,
}

#[derive(Debug, Default)]
struct NameEntry {
    items: Vec<TrackedItem>,
    locked: bool,
}

/// Per-name bookkeeping for one fixpoint iteration.
///
/// The best identity for a name is the non-rejected occurrence with the
/// smallest distance from the root; a tie on distance goes to the
/// highest version.
#[derive(Debug, Default)]
struct Tracker {
    entries: HashMap<String, NameEntry>,
}

impl Tracker {
    fn new() -> Self {
        Self::default()
    }

    fn track(&mut self, item: &GraphItem, depth: usize) {
        let entry = self.entries.entry(item.key.name.key()).or_default();
        if entry.locked {
            return;
        }
        match entry.items.iter_mut().find(|t| t.identity == item.key) {
            Some(existing) => existing.depth = existing.depth.min(depth),
            None => entry.items.push(TrackedItem {
                identity: item.key.clone(),
                depth,
                ambiguous: false,
            }),
        }
    }

    /// References always win over same-name peers.
    fn lock(&mut self, item: &GraphItem, depth: usize) {
        let entry = self.entries.entry(item.key.name.key()).or_default();
        entry.items.clear();
        entry.items.push(TrackedItem {
            identity: item.key.clone(),
            depth,
            ambiguous: false,
        });
        entry.locked = true;
    }

    /// More than one distinct version seen for the item's name.
    fn is_disputed(&self, item: &GraphItem) -> bool {
        self.entries
            .get(&item.key.name.key())
            .is_some_and(|entry| {
                entry
                    .items
                    .iter()
                    .any(|t| t.identity.version != entry.items[0].identity.version)
            })
    }

    fn mark_ambiguous(&mut self, item: &GraphItem) {
        if let Some(entry) = self.entries.get_mut(&item.key.name.key()) {
            if let Some(tracked) = entry.items.iter_mut().find(|t| t.identity == item.key) {
                tracked.ambiguous = true;
            }
        }
    }

    fn is_ambiguous(&self, item: &GraphItem) -> bool {
        self.entries.get(&item.key.name.key()).is_some_and(|entry| {
            entry
                .items
                .iter()
                .any(|t| t.identity == item.key && t.ambiguous)
        })
    }

    fn is_best_version(&self, item: &GraphItem) -> bool {
        let Some(entry) = self.entries.get(&item.key.name.key()) else {
            return false;
        };
        entry
            .items
            .iter()
            .min_by(|a, b| {
                a.depth
                    .cmp(&b.depth)
                    .then_with(|| b.identity.version.cmp(&a.identity.version))
            })
            .is_some_and(|best| best.identity == item.key)
    }
}

/// The classifier's output: one winning identity per accepted name.
#[derive(Debug)]
pub struct ResolvedConflicts {
    /// Keyed by lowercase name.
    pub accepted: HashMap<String, LibraryIdentity>,
    pub iterations: usize,
}

/// Iteratively classify every node as `Accepted` or `Rejected`.
///
/// Each iteration runs three breadth-first passes: track live
/// dispositions, propagate ambiguity below disputed names, then accept
/// or reject. The loop ends when no `Acceptable` node remains, or fails
/// after the patience budget.
pub fn try_resolve_conflicts(graph: &mut ResolutionGraph) -> GalleonResult<ResolvedConflicts> {
    let root = graph.root();
    let mut accepted: HashMap<String, LibraryIdentity> = HashMap::new();
    let mut iterations = 0;

    loop {
        iterations += 1;
        if iterations > PATIENCE {
            return Err(GalleonError::DidNotConverge {
                iterations: PATIENCE,
            }
            .into());
        }

        let mut tracker = Tracker::new();
        accepted.clear();

        // Pass 1: track live dispositions. Cycle and downgrade nodes
        // still attached (when the analysis pass was skipped) are not
        // live either.
        graph.walk_states(root, true, |g, id, &alive| {
            let depth = g.depth(id);
            let node = g.node_mut(id);
            if !alive
                || matches!(
                    node.disposition,
                    Disposition::Rejected | Disposition::Cycle | Disposition::PotentiallyDowngraded
                )
            {
                node.disposition = Disposition::Rejected;
                return Some(false);
            }
            if let Some(ref item) = node.item {
                if item.key.kind == LibraryKind::Reference {
                    tracker.lock(item, depth);
                } else {
                    tracker.track(item, depth);
                }
            }
            Some(true)
        });

        // Pass 2: propagate ambiguity below disputed names.
        graph.walk_states(root, WalkState::Walking, |g, id, &state| {
            let node = g.node(id);
            if state == WalkState::Rejected || node.disposition == Disposition::Rejected {
                return Some(WalkState::Rejected);
            }
            if let Some(ref item) = node.item {
                if state == WalkState::Walking && tracker.is_disputed(item) {
                    return Some(WalkState::Ambiguous);
                }
                if state == WalkState::Ambiguous {
                    tracker.mark_ambiguous(item);
                }
            }
            Some(state)
        });

        // Pass 3: accept or reject what is decidable.
        graph.walk_states(root, true, |g, id, &alive| {
            if !alive || g.node(id).disposition == Disposition::Rejected {
                g.node_mut(id).disposition = Disposition::Rejected;
                return None;
            }
            let (ambiguous, best, item_key) = match g.node(id).item {
                Some(ref item) => (
                    tracker.is_ambiguous(item),
                    tracker.is_best_version(item),
                    Some(item.key.clone()),
                ),
                None => (false, false, None),
            };
            let Some(item_key) = item_key else {
                // Nothing resolved here: the node supplies nothing.
                g.node_mut(id).disposition = Disposition::Rejected;
                return None;
            };
            if ambiguous {
                // Not decidable this iteration; leave the subtree alone.
                return None;
            }
            let node = g.node_mut(id);
            if node.disposition == Disposition::Acceptable {
                node.disposition = if best {
                    Disposition::Accepted
                } else {
                    Disposition::Rejected
                };
            }
            if node.disposition == Disposition::Accepted {
                accepted.insert(item_key.name.key(), item_key);
                Some(true)
            } else {
                None
            }
        });

        let incomplete = graph
            .attached()
            .iter()
            .any(|&id| graph.node(id).disposition == Disposition::Acceptable);
        if !incomplete {
            break;
        }
    }

    // Every rejected request must still be satisfied by the version
    // accepted for its name.
    let mut unresolvable = Vec::new();
    for id in graph.attached() {
        let node = graph.node(id);
        if node.disposition != Disposition::Rejected {
            continue;
        }
        if let Some(winner) = accepted.get(&node.key.name.key()) {
            if !node.key.range.satisfies(&winner.version) {
                unresolvable.push(format!(
                    "Unable to satisfy {} ({}): {} was selected",
                    node.key,
                    graph.path_to(id),
                    winner,
                ));
            }
        }
    }
    if !unresolvable.is_empty() {
        return Err(GalleonError::Constraint {
            message: unresolvable.join("\n"),
        }
        .into());
    }

    Ok(ResolvedConflicts {
        accepted,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ProviderMatch;
    use galleon_core::identity::LibraryRange;
    use galleon_core::range::VersionRange;
    use galleon_core::version::Version;

    fn request(name: &str, range: &str) -> LibraryRange {
        LibraryRange::new(name, VersionRange::parse(range).unwrap())
    }

    fn attach(graph: &mut ResolutionGraph, id: NodeId, name: &str, version: &str) {
        attach_kind(graph, id, name, version, LibraryKind::Package);
    }

    fn attach_kind(
        graph: &mut ResolutionGraph,
        id: NodeId,
        name: &str,
        version: &str,
        kind: LibraryKind,
    ) {
        let mut identity = LibraryIdentity::package(name, Version::parse(version).unwrap());
        identity.kind = kind;
        let range = graph.node(id).key.range.clone();
        graph.node_mut(id).item = Some(GraphItem {
            key: identity.clone(),
            data: ProviderMatch {
                provider: "test".to_string(),
                library: identity,
                range_used: range,
            },
            dependencies: Vec::new(),
        });
    }

    /// Root -> A -> C 1.0, Root -> B -> C 2.0: equal depth, higher
    /// version wins.
    #[test]
    fn equal_depth_higher_version_wins() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");
        let b = graph.add_child(root, request("b", "1.0"));
        attach(&mut graph, b, "b", "1.0.0");
        let c1 = graph.add_child(a, request("c", "1.0"));
        attach(&mut graph, c1, "c", "1.0.0");
        let c2 = graph.add_child(b, request("c", "2.0"));
        attach(&mut graph, c2, "c", "2.0.0");

        let resolved = try_resolve_conflicts(&mut graph).unwrap();
        assert_eq!(graph.node(c2).disposition, Disposition::Accepted);
        assert_eq!(graph.node(c1).disposition, Disposition::Rejected);
        assert_eq!(
            resolved.accepted.get("c").unwrap().version,
            Version::parse("2.0.0").unwrap()
        );
    }

    /// Root -> X 2.0, Root -> A -> X 1.5: nearer wins regardless of
    /// version.
    #[test]
    fn nearer_occurrence_wins() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let x_direct = graph.add_child(root, request("x", "2.0"));
        attach(&mut graph, x_direct, "x", "2.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");
        let x_deep = graph.add_child(a, request("x", "1.5"));
        attach(&mut graph, x_deep, "x", "1.5.0");

        let resolved = try_resolve_conflicts(&mut graph).unwrap();
        assert_eq!(graph.node(x_direct).disposition, Disposition::Accepted);
        assert_eq!(graph.node(x_deep).disposition, Disposition::Rejected);
        assert_eq!(
            resolved.accepted.get("x").unwrap().version,
            Version::parse("2.0.0").unwrap()
        );
    }

    /// A rejected pin that the winner cannot satisfy fails resolution.
    #[test]
    fn unsatisfiable_rejection_is_a_constraint_error() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let x_direct = graph.add_child(root, request("x", "2.0"));
        attach(&mut graph, x_direct, "x", "2.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");
        // Pinned to exactly 1.5: the accepted 2.0 cannot satisfy it.
        let x_pinned = graph.add_child(a, request("x", "[1.5]"));
        attach(&mut graph, x_pinned, "x", "1.5.0");

        let error = try_resolve_conflicts(&mut graph).unwrap_err();
        assert!(error.to_string().contains("Unable to resolve"));
    }

    /// References always win over same-name package occurrences, even
    /// nearer, higher-versioned ones.
    #[test]
    fn references_lock_their_name() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let package = graph.add_child(root, request("x", "1.0"));
        attach(&mut graph, package, "x", "3.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");
        let reference = graph.add_child(a, request("x", "1.0"));
        attach_kind(&mut graph, reference, "x", "1.0.0", LibraryKind::Reference);

        let resolved = try_resolve_conflicts(&mut graph).unwrap();
        assert_eq!(graph.node(reference).disposition, Disposition::Accepted);
        assert_eq!(graph.node(package).disposition, Disposition::Rejected);
        assert_eq!(
            resolved.accepted.get("x").unwrap().kind,
            LibraryKind::Reference
        );
    }

    /// Cycle nodes are detached and reported; resolution proceeds.
    #[test]
    fn cycles_detach_and_report() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");
        let b = graph.add_child(a, request("b", "1.0"));
        attach(&mut graph, b, "b", "1.0.0");
        let a_again = graph.add_child(b, request("a", "1.0"));
        graph.node_mut(a_again).disposition = Disposition::Cycle;

        let analysis = check_cycle_and_nearest_wins(&mut graph);
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(
            analysis.cycles[0].path,
            "root 1.0.0 -> a 1.0.0 -> b 1.0.0 -> a 1.0"
        );
        assert!(!graph.attached().contains(&a_again));

        let resolved = try_resolve_conflicts(&mut graph).unwrap();
        assert_eq!(resolved.accepted.len(), 3);
    }

    /// Root -> A -> B 2.0, Root -> B 1.0: the deeper, higher request is
    /// detached as a downgrade; the direct request wins.
    #[test]
    fn downgrades_detach_and_report() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");
        let b_direct = graph.add_child(root, request("b", "1.0"));
        attach(&mut graph, b_direct, "b", "1.0.0");
        let b_deep = graph.add_child(a, request("b", "2.0"));
        attach(&mut graph, b_deep, "b", "2.0.0");
        // The walker flagged the deeper request that loses to the
        // nearer, lower one.
        graph.node_mut(b_deep).disposition = Disposition::PotentiallyDowngraded;

        let analysis = check_cycle_and_nearest_wins(&mut graph);
        assert!(analysis.cycles.is_empty());
        assert_eq!(analysis.downgrades.len(), 1);
        assert_eq!(analysis.downgrades[0].node, b_deep);
        assert_eq!(analysis.downgrades[0].downgraded_by, b_direct);
        assert!(!graph.attached().contains(&b_deep));

        let resolved = try_resolve_conflicts(&mut graph).unwrap();
        assert_eq!(
            resolved.accepted.get("b").unwrap().version,
            Version::parse("1.0.0").unwrap()
        );
    }

    /// Re-running the fixpoint on a resolved graph changes nothing.
    #[test]
    fn idempotent_on_resolved_graphs() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        let a = graph.add_child(root, request("a", "1.0"));
        attach(&mut graph, a, "a", "1.0.0");

        let first = try_resolve_conflicts(&mut graph).unwrap();
        let dispositions: Vec<Disposition> = graph
            .attached()
            .iter()
            .map(|&id| graph.node(id).disposition)
            .collect();
        let second = try_resolve_conflicts(&mut graph).unwrap();
        let after: Vec<Disposition> = graph
            .attached()
            .iter()
            .map(|&id| graph.node(id).disposition)
            .collect();

        assert_eq!(dispositions, after);
        assert_eq!(first.accepted, second.accepted);
        assert_eq!(second.iterations, 1);
    }

    /// No `Acceptable` disposition survives the fixpoint.
    #[test]
    fn no_acceptable_remains() {
        let mut graph = ResolutionGraph::new(request("root", "1.0"));
        let root = graph.root();
        attach(&mut graph, root, "root", "1.0.0");
        for name in ["a", "b", "c"] {
            let child = graph.add_child(root, request(name, "1.0"));
            attach(&mut graph, child, name, "1.0.0");
            let shared = graph.add_child(child, request("shared", "1.0"));
            attach(&mut graph, shared, "shared", "1.0.0");
        }

        try_resolve_conflicts(&mut graph).unwrap();
        for id in graph.attached() {
            assert!(matches!(
                graph.node(id).disposition,
                Disposition::Accepted | Disposition::Rejected
            ));
        }
    }
}
