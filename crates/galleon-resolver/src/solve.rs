//! Combinatorial resolver: selects exactly one version per id across
//! the closure via preference-ordered depth-first search with pairwise
//! rejection.

use std::collections::{HashMap, HashSet};

use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::{LibraryIdentity, PackageName};
use galleon_core::range::VersionRange;
use galleon_core::version::Version;
use galleon_util::errors::{GalleonError, GalleonResult};

use crate::compare::{DependencyBehavior, ResolverComparer};
use crate::diagnostics;

/// Depth cap for the circular-dependency check; deeper chains are
/// treated as acyclic.
const MAX_CYCLE_DEPTH: usize = 20;

/// Flat metadata for one available package version.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub id: PackageName,
    pub version: Version,
    pub listed: bool,
    pub dependencies: Vec<LibraryDependency>,
}

/// A search candidate: a concrete version, or the absent sentinel that
/// lets the search omit an id entirely.
#[derive(Debug, Clone)]
pub struct ResolverPackage {
    pub id: PackageName,
    pub version: Option<Version>,
    pub dependencies: Vec<LibraryDependency>,
    pub listed: bool,
    pub absent: bool,
}

impl ResolverPackage {
    pub fn absent(id: PackageName) -> Self {
        Self {
            id,
            version: None,
            dependencies: Vec::new(),
            listed: true,
            absent: true,
        }
    }

    fn from_info(info: &PackageInfo, ignore_dependencies: bool) -> Self {
        Self {
            id: info.id.clone(),
            version: Some(info.version.clone()),
            dependencies: if ignore_dependencies {
                Vec::new()
            } else {
                info.dependencies.clone()
            },
            listed: info.listed,
            absent: false,
        }
    }
}

/// Caller input for a combinatorial resolution.
#[derive(Debug, Default)]
pub struct SolveContext {
    pub available: Vec<PackageInfo>,
    /// Ids that must appear in the solution, in caller order.
    pub required_ids: Vec<PackageName>,
    /// The subset of required ids being newly installed.
    pub target_ids: HashSet<PackageName>,
    /// Installed versions to prefer for non-target ids.
    pub preferred_versions: HashMap<PackageName, Version>,
    /// Additional allowed-version constraints from the installed
    /// configuration.
    pub installed_constraints: HashMap<PackageName, VersionRange>,
    pub behavior: DependencyBehavior,
}

/// Resolve to one identity per id, topologically sorted so that every
/// package precedes its dependents.
pub fn resolve(context: &SolveContext) -> GalleonResult<Vec<LibraryIdentity>> {
    let available_ids: HashSet<&PackageName> = context.available.iter().map(|p| &p.id).collect();
    for id in &context.required_ids {
        if !available_ids.contains(id) {
            return Err(GalleonError::Input {
                message: format!("Unknown required package id `{id}`"),
            }
            .into());
        }
    }
    for target in &context.target_ids {
        if !context.required_ids.contains(target) {
            return Err(GalleonError::Input {
                message: format!("Target id `{target}` is not in the required set"),
            }
            .into());
        }
    }

    let required: HashSet<PackageName> = context.required_ids.iter().cloned().collect();

    // Allowed-version constraints narrow the candidate set up front.
    let mut available: Vec<PackageInfo> = context
        .available
        .iter()
        .filter(|info| match context.installed_constraints.get(&info.id) {
            Some(allowed) => allowed.satisfies(&info.version),
            None => true,
        })
        .cloned()
        .collect();

    prune_impossible(&mut available, &required);

    // Group candidates by id, preserving first-appearance order; the
    // group order is the slot order of the search.
    let ignore = context.behavior == DependencyBehavior::Ignore;
    let mut order: Vec<PackageName> = Vec::new();
    let mut by_id: HashMap<PackageName, Vec<ResolverPackage>> = HashMap::new();
    for info in &available {
        if !by_id.contains_key(&info.id) {
            order.push(info.id.clone());
        }
        by_id
            .entry(info.id.clone())
            .or_default()
            .push(ResolverPackage::from_info(info, ignore));
    }
    // Ids the solution may omit get the absent sentinel.
    for id in &order {
        if !required.contains(id) {
            if let Some(group) = by_id.get_mut(id) {
                group.push(ResolverPackage::absent(id.clone()));
            }
        }
    }
    // Dependency ids with no available package can only be absent.
    let mut missing: Vec<PackageName> = Vec::new();
    for info in &available {
        for dep in &info.dependencies {
            let name = &dep.library_range.name;
            if !by_id.contains_key(name) && !missing.contains(name) {
                missing.push(name.clone());
            }
        }
    }
    for name in missing {
        order.push(name.clone());
        by_id.insert(name.clone(), vec![ResolverPackage::absent(name)]);
    }

    // A required id whose versions were all filtered away can no longer
    // be satisfied at all.
    for id in &context.required_ids {
        let satisfiable = by_id
            .get(id)
            .is_some_and(|group| group.iter().any(|p| !p.absent));
        if !satisfiable {
            let message = format!("No available version of '{id}' satisfies its constraints");
            let message = match context.installed_constraints.get(id) {
                Some(allowed) => format!(
                    "{message}\nNote: '{id}' has an additional constraint ({allowed}) from the installed package configuration"
                ),
                None => message,
            };
            return Err(GalleonError::Constraint { message }.into());
        }
    }

    let comparer = ResolverComparer::new(
        context.behavior,
        &context.preferred_versions,
        &context.target_ids,
        &required,
    );
    for group in by_id.values_mut() {
        group.sort_by(|a, b| comparer.compare(a, b));
    }
    let groups: Vec<Vec<ResolverPackage>> = order
        .iter()
        .map(|id| by_id.remove(id).unwrap_or_default())
        .collect();

    let mut best_attempt: Vec<ResolverPackage> = Vec::new();
    let solution = search(&groups, &mut Vec::new(), &mut best_attempt);

    let Some(solution) = solution else {
        return Err(GalleonError::Constraint {
            message: diagnostics::describe_unsolvable(context, &best_attempt),
        }
        .into());
    };

    let chosen: Vec<ResolverPackage> = solution.into_iter().filter(|p| !p.absent).collect();
    if let Some(cycle) = find_cycle(&chosen) {
        return Err(GalleonError::Constraint {
            message: format!("Circular dependency detected: {}", cycle.join(" -> ")),
        }
        .into());
    }

    Ok(topological_sort(chosen)
        .into_iter()
        .filter_map(|p| {
            let version = p.version?;
            Some(LibraryIdentity::package(p.id, version))
        })
        .collect())
}

/// Drop candidates that no combined constraint can ever accept, to a
/// fixpoint. Required ids are never dropped.
fn prune_impossible(available: &mut Vec<PackageInfo>, required: &HashSet<PackageName>) {
    loop {
        let mut ranges: HashMap<PackageName, Vec<VersionRange>> = HashMap::new();
        for info in available.iter() {
            for dep in &info.dependencies {
                ranges
                    .entry(dep.library_range.name.clone())
                    .or_default()
                    .push(dep.library_range.range.clone());
            }
        }
        let combined: HashMap<PackageName, VersionRange> = ranges
            .into_iter()
            .map(|(id, ranges)| (id, VersionRange::combine(ranges.iter())))
            .collect();

        let before = available.len();
        available.retain(|info| {
            required.contains(&info.id)
                || combined
                    .get(&info.id)
                    .is_none_or(|range| range.satisfies(&info.version))
        });
        if available.len() == before {
            break;
        }
    }
}

/// Ordered depth-first search: one candidate per group, rejecting a
/// partial assignment as soon as any chosen pair conflicts. The deepest
/// partial assignment explored is kept for diagnostics.
fn search(
    groups: &[Vec<ResolverPackage>],
    chosen: &mut Vec<ResolverPackage>,
    best_attempt: &mut Vec<ResolverPackage>,
) -> Option<Vec<ResolverPackage>> {
    if chosen.len() > best_attempt.len() {
        *best_attempt = chosen.clone();
    }
    let Some(group) = groups.get(chosen.len()) else {
        return Some(chosen.clone());
    };
    for candidate in group {
        if chosen
            .iter()
            .any(|existing| should_reject_pair(existing, candidate))
        {
            continue;
        }
        chosen.push(candidate.clone());
        if let Some(solution) = search(groups, chosen, best_attempt) {
            return Some(solution);
        }
        chosen.pop();
    }
    None
}

/// Whether two chosen packages cannot coexist: one declares a
/// dependency on the other and the other is absent or out of range.
pub(crate) fn should_reject_pair(a: &ResolverPackage, b: &ResolverPackage) -> bool {
    rejects(a, b) || rejects(b, a)
}

fn rejects(from: &ResolverPackage, to: &ResolverPackage) -> bool {
    if from.absent {
        return false;
    }
    for dep in &from.dependencies {
        if dep.library_range.name != to.id || dep.optional {
            continue;
        }
        match to.version {
            Some(ref version) => {
                if !dep.library_range.range.satisfies(version) {
                    return true;
                }
            }
            None => return true,
        }
    }
    false
}

/// Find a dependency cycle among the chosen packages, if one exists
/// within the depth cap. Returns the cycle as a display path.
fn find_cycle(packages: &[ResolverPackage]) -> Option<Vec<String>> {
    let by_id: HashMap<&PackageName, &ResolverPackage> =
        packages.iter().map(|p| (&p.id, p)).collect();

    fn visit<'a>(
        package: &'a ResolverPackage,
        by_id: &HashMap<&PackageName, &'a ResolverPackage>,
        path: &mut Vec<&'a PackageName>,
    ) -> Option<Vec<String>> {
        if path.len() >= MAX_CYCLE_DEPTH {
            return None;
        }
        if let Some(start) = path.iter().position(|&id| id == &package.id) {
            let mut cycle: Vec<String> =
                path[start..].iter().map(|id| id.to_string()).collect();
            cycle.push(package.id.to_string());
            return Some(cycle);
        }
        path.push(&package.id);
        for dep in &package.dependencies {
            if let Some(next) = by_id.get(&dep.library_range.name) {
                if let Some(cycle) = visit(next, by_id, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }

    for package in packages {
        if let Some(cycle) = visit(package, &by_id, &mut Vec::new()) {
            return Some(cycle);
        }
    }
    None
}

/// Kahn-style topological sort: packages with no unmet dependencies
/// drain first, ties resolved case-insensitively by id. For any pair
/// where `a` depends on `b`, `b` precedes `a`.
fn topological_sort(packages: Vec<ResolverPackage>) -> Vec<ResolverPackage> {
    let mut remaining = packages;
    let mut sorted = Vec::with_capacity(remaining.len());
    let mut emitted: HashSet<PackageName> = HashSet::new();

    while !remaining.is_empty() {
        let in_set: HashSet<PackageName> = remaining.iter().map(|p| p.id.clone()).collect();
        let ready: HashSet<PackageName> = remaining
            .iter()
            .filter(|p| {
                p.dependencies.iter().all(|d| {
                    let name = &d.library_range.name;
                    emitted.contains(name) || !in_set.contains(name)
                })
            })
            .map(|p| p.id.clone())
            .collect();

        // A residual cycle (beyond the capped detector) would stall the
        // drain; emit the remainder in id order instead of looping.
        let ready = if ready.is_empty() { in_set } else { ready };

        let mut batch: Vec<ResolverPackage> = Vec::new();
        let mut rest: Vec<ResolverPackage> = Vec::new();
        for package in remaining {
            if ready.contains(&package.id) {
                batch.push(package);
            } else {
                rest.push(package);
            }
        }
        batch.sort_by(|a, b| a.id.cmp(&b.id));
        for package in batch {
            emitted.insert(package.id.clone());
            sorted.push(package);
        }
        remaining = rest;
    }

    sorted
}
