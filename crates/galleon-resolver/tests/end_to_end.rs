//! Full pipeline: walk, cycle/downgrade analysis, conflict fixpoint,
//! flattened output graph.

mod common;

use std::sync::Arc;

use common::TestProvider;
use galleon_core::identity::LibraryRange;
use galleon_core::platform::Platform;
use galleon_core::range::VersionRange;
use galleon_core::version::Version;
use galleon_provider::MetadataProvider;
use galleon_resolver::conflict::{check_cycle_and_nearest_wins, try_resolve_conflicts};
use galleon_resolver::graph::Disposition;
use galleon_resolver::resolved::ResolvedGraph;
use galleon_resolver::walker::RemoteWalker;
use galleon_util::cancel::CancelToken;

fn request(name: &str, range: &str) -> LibraryRange {
    LibraryRange::new(name, VersionRange::parse(range).unwrap())
}

fn version(text: &str) -> Version {
    Version::parse(text).unwrap()
}

async fn walk(provider: TestProvider, target: &str) -> galleon_resolver::graph::ResolutionGraph {
    let provider: Arc<dyn MetadataProvider> = Arc::new(provider);
    RemoteWalker::new(vec![provider])
        .walk(
            request(target, "1.0.0"),
            &Platform::any(),
            None,
            None,
            &CancelToken::new(),
        )
        .await
        .unwrap()
}

/// Equal depth: the higher version of a shared dependency wins and the
/// lower one is rejected.
#[tokio::test]
async fn nearest_wins_prefers_higher_version_at_equal_depth() {
    let provider = TestProvider::new("registry")
        .package("app", "1.0.0", &[("a", "1.0.0"), ("b", "1.0.0")])
        .package("a", "1.0.0", &[("c", "1.0.0")])
        .package("b", "1.0.0", &[("c", "2.0.0")])
        .package("c", "1.0.0", &[])
        .package("c", "2.0.0", &[]);

    let mut graph = walk(provider, "app").await;
    check_cycle_and_nearest_wins(&mut graph);
    let resolved = try_resolve_conflicts(&mut graph).unwrap();

    assert_eq!(resolved.accepted.get("c").unwrap().version, version("2.0.0"));
    for id in graph.attached() {
        assert!(matches!(
            graph.node(id).disposition,
            Disposition::Accepted | Disposition::Rejected
        ));
    }
}

/// Root -> A -> B 2.0 with a direct B 1.0: the deeper request is
/// detached as a downgrade and the direct version is accepted.
#[tokio::test]
async fn downgrades_are_detached_and_reported() {
    let provider = TestProvider::new("registry")
        .package("app", "1.0.0", &[("a", "1.0.0"), ("b", "1.0.0")])
        .package("a", "1.0.0", &[("b", "2.0.0")])
        .package("b", "1.0.0", &[])
        .package("b", "2.0.0", &[]);

    let mut graph = walk(provider, "app").await;
    let analysis = check_cycle_and_nearest_wins(&mut graph);

    assert_eq!(analysis.downgrades.len(), 1);
    assert!(analysis.downgrades[0].path.contains("a 1.0.0"));
    assert!(analysis.downgrades[0].winning_path.contains("b 1.0.0"));

    let resolved = try_resolve_conflicts(&mut graph).unwrap();
    assert_eq!(resolved.accepted.get("b").unwrap().version, version("1.0.0"));
}

/// A -> B -> A is detached as a cycle and reported, not an error.
#[tokio::test]
async fn cycles_are_detached_and_reported() {
    let provider = TestProvider::new("registry")
        .package("a", "1.0.0", &[("b", "1.0.0")])
        .package("b", "1.0.0", &[("a", "1.0.0")]);

    let mut graph = walk(provider, "a").await;
    let analysis = check_cycle_and_nearest_wins(&mut graph);

    assert_eq!(analysis.cycles.len(), 1);
    assert_eq!(analysis.cycles[0].path, "a 1.0.0 -> b 1.0.0 -> a 1.0.0");

    let resolved = try_resolve_conflicts(&mut graph).unwrap();
    assert_eq!(resolved.accepted.len(), 2);
}

/// The accepted subgraph flattens into an acyclic resolved graph with a
/// single identity per name.
#[tokio::test]
async fn resolved_graph_flattens_the_accepted_subgraph() {
    let provider = TestProvider::new("registry")
        .package("app", "1.0.0", &[("a", "1.0.0"), ("b", "1.0.0")])
        .package("a", "1.0.0", &[("c", "1.0.0")])
        .package("b", "1.0.0", &[("c", "2.0.0")])
        .package("c", "1.0.0", &[])
        .package("c", "2.0.0", &[]);

    let mut graph = walk(provider, "app").await;
    check_cycle_and_nearest_wins(&mut graph);
    try_resolve_conflicts(&mut graph).unwrap();

    let resolved = ResolvedGraph::from_resolution(&graph);
    assert_eq!(resolved.len(), 3);
    let c = resolved.find("c").unwrap();
    assert_eq!(resolved.node(c).identity.version, version("2.0.0"));

    let tree = resolved.print_tree(None);
    assert!(tree.starts_with("app 1.0.0\n"));
    assert!(tree.contains("c 2.0.0"));

    let path = resolved.find_path("c").unwrap();
    assert_eq!(path.first().unwrap().identity.name.as_str(), "app");
}

/// Rerunning the fixpoint over an already classified graph changes no
/// dispositions.
#[tokio::test]
async fn reresolution_is_idempotent() {
    let provider = TestProvider::new("registry")
        .package("app", "1.0.0", &[("a", "1.0.0")])
        .package("a", "1.0.0", &[]);

    let mut graph = walk(provider, "app").await;
    check_cycle_and_nearest_wins(&mut graph);
    let first = try_resolve_conflicts(&mut graph).unwrap();
    let before: Vec<Disposition> = graph
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

    assert_eq!(before, after);
    assert_eq!(first.accepted, second.accepted);
}
