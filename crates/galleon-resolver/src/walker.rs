//! Remote dependency walker: builds the resolution tree by racing every
//! provider in the chain for each library lookup.
//!
//! Per-library resolution:
//! 1. Start a lookup on every registered provider concurrently.
//! 2. The first provider to return an *exact* match (the range's pinned
//!    version or inclusive floor) wins immediately; the rest are
//!    aborted.
//! 3. Otherwise all responses are collected and ranked under the
//!    range's preference, ties broken by provider order.
//!
//! The walk itself is breadth-first: each depth level's lookups run in
//! parallel (bounded by a semaphore), then the level is processed
//! structurally — cycles marked, downgrades flagged, children enqueued.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use galleon_core::dependency::{IncludeFlags, LibraryDependency, SuppressParent};
use galleon_core::identity::{LibraryIdentity, LibraryKind, LibraryRange};
use galleon_core::platform::Platform;
use galleon_core::range::VersionRange;
use galleon_core::runtime::RuntimeGraph;
use galleon_provider::MetadataProvider;
use galleon_util::cancel::CancelToken;
use galleon_util::errors::{GalleonError, GalleonResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::{InFlightCache, LookupKey, LookupResult};
use crate::graph::{Disposition, GraphItem, NodeId, ProviderMatch, ResolutionGraph};

const MAX_CONCURRENT_LOOKUPS: usize = 8;
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Walks dependency trees against an ordered provider chain.
pub struct RemoteWalker {
    providers: Vec<Arc<dyn MetadataProvider>>,
    cache: Arc<InFlightCache>,
}

/// Entry in the breadth-first walk queue.
struct QueueEntry {
    node: NodeId,
    depth: usize,
    optional: bool,
}

impl RemoteWalker {
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>) -> Self {
        Self::with_cache(providers, Arc::new(InFlightCache::new()))
    }

    /// Share a lookup cache across walkers. The cache lives as long as
    /// the resolution session that owns it.
    pub fn with_cache(providers: Vec<Arc<dyn MetadataProvider>>, cache: Arc<InFlightCache>) -> Self {
        Self { providers, cache }
    }

    /// Build the resolution tree for `target`.
    ///
    /// The returned graph has raw dispositions: run
    /// [`conflict::check_cycle_and_nearest_wins`] and
    /// [`conflict::try_resolve_conflicts`] on it next.
    ///
    /// [`conflict::check_cycle_and_nearest_wins`]: crate::conflict::check_cycle_and_nearest_wins
    /// [`conflict::try_resolve_conflicts`]: crate::conflict::try_resolve_conflicts
    pub async fn walk(
        &self,
        target: LibraryRange,
        platform: &Platform,
        runtime_id: Option<&str>,
        runtime_graph: Option<&RuntimeGraph>,
        cancel: &CancelToken,
    ) -> GalleonResult<ResolutionGraph> {
        let mut graph = ResolutionGraph::new(target);
        let mut queue = VecDeque::new();
        queue.push_back(QueueEntry {
            node: graph.root(),
            depth: 0,
            optional: false,
        });
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_LOOKUPS));

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                return Err(GalleonError::Cancelled.into());
            }

            // Drain the current depth level from the front of the queue.
            let current_depth = queue.front().map(|e| e.depth).unwrap_or(0);
            let mut level: Vec<QueueEntry> = Vec::new();
            while queue.front().is_some_and(|e| e.depth == current_depth) {
                level.push(queue.pop_front().unwrap());
            }

            // Mark cycles up front so their lookups are skipped.
            for entry in &level {
                if self.has_same_name_ancestor(&graph, entry.node) {
                    graph.node_mut(entry.node).disposition = Disposition::Cycle;
                }
            }

            // Claim the level's lookups and race providers in parallel.
            let mut join_set = JoinSet::new();
            for entry in &level {
                let node = graph.node(entry.node);
                if node.disposition == Disposition::Cycle {
                    continue;
                }
                let key = LookupKey::new(&node.key, platform);
                if !self.cache.register(&key) {
                    continue;
                }
                let request = node.key.clone();
                let providers = self.providers.clone();
                let platform = platform.clone();
                let cancel = cancel.clone();
                let cache = self.cache.clone();
                let semaphore = semaphore.clone();
                join_set.spawn(async move {
                    let _permit = semaphore.acquire().await;
                    match race_providers(&providers, &request, &platform, &cancel).await {
                        Ok(result) => {
                            cache.done(&key, result);
                            Ok(())
                        }
                        Err(error) => {
                            // Publish before failing so concurrent
                            // waiters are not left hanging.
                            cache.done(
                                &key,
                                LookupResult {
                                    item: None,
                                    all_failed: true,
                                },
                            );
                            Err(error)
                        }
                    }
                });
            }
            while let Some(joined) = join_set.join_next().await {
                joined.map_err(|e| GalleonError::Generic {
                    message: format!("Lookup task failed: {e}"),
                })??;
            }

            // Structural phase: attach items, flag downgrades, enqueue
            // children for the next level.
            for entry in level {
                let id = entry.node;
                if graph.node(id).disposition == Disposition::Cycle {
                    continue;
                }
                let key = LookupKey::new(&graph.node(id).key, platform);
                let result = self.cache.wait(&key, cancel).await?;

                let Some(mut item) = result.item else {
                    if result.all_failed && !entry.optional {
                        return Err(GalleonError::Generic {
                            message: format!(
                                "Unable to resolve {}: every provider failed",
                                graph.node(id).key
                            ),
                        }
                        .into());
                    }
                    tracing::warn!("No provider could satisfy {}", graph.node(id).key);
                    continue;
                };

                if let (Some(rid), Some(runtimes)) = (runtime_id, runtime_graph) {
                    augment_runtime_dependencies(&mut item, rid, runtimes)?;
                }

                // A nearer same-name request with a lower floor will win
                // by nearest-wins, downgrading this node. Keep the node
                // for reporting but do not walk below it.
                if self.is_potential_downgrade(&graph, id) {
                    graph.node_mut(id).disposition = Disposition::PotentiallyDowngraded;
                    graph.node_mut(id).item = Some(item);
                    continue;
                }

                let dependencies = item.dependencies.clone();
                graph.node_mut(id).item = Some(item);
                for dependency in dependencies {
                    if !walkable(&dependency, entry.depth) {
                        continue;
                    }
                    let child = graph.add_child(id, dependency.library_range.clone());
                    queue.push_back(QueueEntry {
                        node: child,
                        depth: entry.depth + 1,
                        optional: dependency.optional,
                    });
                }
            }
        }

        for id in graph.unresolved() {
            tracing::debug!("Unresolved: {}", graph.path_to(id));
        }
        Ok(graph)
    }

    fn has_same_name_ancestor(&self, graph: &ResolutionGraph, id: NodeId) -> bool {
        let name = &graph.node(id).key.name;
        graph
            .ancestors(id)
            .any(|ancestor| &graph.node(ancestor).key.name == name)
    }

    /// A node is a potential downgrade when a sibling of any ancestor
    /// requests the same name with a strictly lower minimum version:
    /// that nearer request wins, forcing this node's floor downward.
    fn is_potential_downgrade(&self, graph: &ResolutionGraph, id: NodeId) -> bool {
        let name = &graph.node(id).key.name;
        let Some(own_min) = graph.node(id).key.range.min_version() else {
            return false;
        };

        let mut on_path = id;
        for ancestor in graph.ancestors(id) {
            for &cousin in &graph.node(ancestor).inner {
                if cousin == on_path {
                    continue;
                }
                let cousin_key = &graph.node(cousin).key;
                if &cousin_key.name == name
                    && cousin_key
                        .range
                        .min_version()
                        .is_some_and(|other| other < own_min)
                {
                    return true;
                }
            }
            on_path = ancestor;
        }
        false
    }
}

/// Whether the walk descends through a dependency edge.
///
/// Edges that suppress their parent are only honored on the root's own
/// dependencies; declared by a transitive package they stay private to
/// it. Edges that include no assets at all are never walked.
fn walkable(dependency: &LibraryDependency, parent_depth: usize) -> bool {
    if dependency.include == IncludeFlags::none() {
        return false;
    }
    dependency.suppress_parent == SuppressParent::None || parent_depth == 0
}

/// Race every eligible provider for one lookup.
async fn race_providers(
    providers: &[Arc<dyn MetadataProvider>],
    request: &LibraryRange,
    platform: &Platform,
    cancel: &CancelToken,
) -> GalleonResult<LookupResult> {
    let mut join_set = JoinSet::new();
    let mut eligible = 0usize;
    for (index, provider) in providers.iter().enumerate() {
        // Remote sources cannot answer for project references.
        if request.kind == Some(LibraryKind::Project) && provider.is_http() {
            continue;
        }
        eligible += 1;
        let provider = provider.clone();
        let request = request.clone();
        let platform = platform.clone();
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let found = find_with_retry(provider.as_ref(), &request, &platform, &cancel).await;
            (index, found)
        });
    }
    if eligible == 0 {
        return Ok(LookupResult {
            item: None,
            all_failed: false,
        });
    }

    let mut matches: Vec<(usize, LibraryIdentity)> = Vec::new();
    let mut failures = 0usize;
    let mut winner: Option<(usize, LibraryIdentity)> = None;

    while let Some(joined) = join_set.join_next().await {
        let (index, outcome) = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => {
                return Err(GalleonError::Generic {
                    message: format!("Provider task failed: {e}"),
                }
                .into())
            }
        };
        match outcome {
            Ok(Some(identity)) => {
                if request.range.is_exact(&identity.version) {
                    // First exact match ends the race.
                    join_set.abort_all();
                    winner = Some((index, identity));
                    break;
                }
                matches.push((index, identity));
            }
            Ok(None) => {}
            Err(error) => {
                if is_cancelled(&error) {
                    join_set.abort_all();
                    return Err(error);
                }
                failures += 1;
                tracing::warn!("Provider lookup for {request} failed: {error}");
            }
        }
    }

    let all_failed = winner.is_none() && matches.is_empty() && failures == eligible;

    if winner.is_none() {
        // Deterministic rank: highest preference wins, ties go to the
        // earliest provider in the chain.
        matches.sort_by_key(|(index, _)| *index);
        for (index, identity) in matches {
            winner = match winner {
                None => Some((index, identity)),
                Some((best_index, best)) => {
                    if request.range.is_better(&identity.version, &best.version) {
                        Some((index, identity))
                    } else {
                        Some((best_index, best))
                    }
                }
            };
        }
    }

    let Some((index, identity)) = winner else {
        return Ok(LookupResult {
            item: None,
            all_failed,
        });
    };

    let provider = &providers[index];
    let dependencies =
        match dependencies_with_retry(provider.as_ref(), &identity, platform, cancel).await {
            Ok(dependencies) => dependencies,
            Err(error) => {
                if is_cancelled(&error) {
                    return Err(error);
                }
                tracing::warn!(
                    "Failed to read dependencies of {identity} from {}: {error}",
                    provider.name()
                );
                return Ok(LookupResult {
                    item: None,
                    all_failed: false,
                });
            }
        };

    Ok(LookupResult {
        item: Some(GraphItem {
            key: identity.clone(),
            data: ProviderMatch {
                provider: provider.name().to_string(),
                library: identity,
                range_used: request.range.clone(),
            },
            dependencies,
        }),
        all_failed: false,
    })
}

/// `find_library` with a single retry on transient failure.
async fn find_with_retry(
    provider: &dyn MetadataProvider,
    request: &LibraryRange,
    platform: &Platform,
    cancel: &CancelToken,
) -> GalleonResult<Option<LibraryIdentity>> {
    match provider.find_library(request, platform, cancel).await {
        Ok(found) => Ok(found),
        Err(error) if is_transient(&error) => {
            tracing::warn!(
                "Transient failure from {} for {request}, retrying once: {error}",
                provider.name()
            );
            tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
            provider.find_library(request, platform, cancel).await
        }
        Err(error) => Err(error),
    }
}

/// `get_dependencies` with a single retry on transient failure.
async fn dependencies_with_retry(
    provider: &dyn MetadataProvider,
    identity: &LibraryIdentity,
    platform: &Platform,
    cancel: &CancelToken,
) -> GalleonResult<Vec<LibraryDependency>> {
    match provider.get_dependencies(identity, platform, cancel).await {
        Ok(dependencies) => Ok(dependencies),
        Err(error) if is_transient(&error) => {
            tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
            provider.get_dependencies(identity, platform, cancel).await
        }
        Err(error) => Err(error),
    }
}

/// Merge runtime-specific dependencies into a resolved item. A runtime
/// dependency pins the range of a same-name declared dependency, or
/// appends a new edge.
fn augment_runtime_dependencies(
    item: &mut GraphItem,
    runtime_id: &str,
    runtimes: &RuntimeGraph,
) -> GalleonResult<()> {
    for extra in runtimes.find_runtime_dependencies(runtime_id, item.key.name.as_str()) {
        let range = VersionRange::parse(&extra.range).map_err(|e| GalleonError::Parse {
            message: format!("Bad runtime dependency range `{}`: {e}", extra.range),
        })?;
        let library_range = LibraryRange::new(extra.id.as_str(), range);
        match item
            .dependencies
            .iter_mut()
            .find(|d| d.library_range.name == library_range.name)
        {
            Some(existing) => existing.library_range = library_range,
            None => item.dependencies.push(LibraryDependency::new(library_range)),
        }
    }
    Ok(())
}

fn is_transient(error: &miette::Report) -> bool {
    error
        .downcast_ref::<GalleonError>()
        .is_some_and(GalleonError::is_transient)
}

fn is_cancelled(error: &miette::Report) -> bool {
    matches!(
        error.downcast_ref::<GalleonError>(),
        Some(GalleonError::Cancelled)
    )
}
