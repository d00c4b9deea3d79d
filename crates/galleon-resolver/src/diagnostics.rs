//! Human-readable explanations for infeasible combinatorial
//! resolutions.
//!
//! One primary cause is selected, in priority order: a new target that
//! conflicts with another chosen or required package, a new target with
//! a missing dependency, an installed package whose dependencies broke,
//! then a transitive package with missing dependencies (nearest to the
//! required set first). The chosen message is augmented with any
//! allowed-version constraints involved.

use std::collections::{HashMap, HashSet, VecDeque};

use galleon_core::dependency::LibraryDependency;
use galleon_core::identity::PackageName;

use crate::solve::{ResolverPackage, SolveContext};

/// BFS depth cap when ranking transitive packages.
const MAX_DIAGNOSTIC_DEPTH: usize = 20;

pub(crate) fn describe_unsolvable(
    context: &SolveContext,
    best_attempt: &[ResolverPackage],
) -> String {
    let chosen: HashMap<String, &ResolverPackage> = best_attempt
        .iter()
        .filter(|p| !p.absent)
        .map(|p| (p.id.key(), p))
        .collect();
    let required: HashSet<&PackageName> = context.required_ids.iter().collect();

    // 1. A new target incompatible with a chosen or required package.
    for id in &context.required_ids {
        if !context.target_ids.contains(id) {
            continue;
        }
        let Some(target) = chosen.get(&id.key()) else {
            continue;
        };
        if let Some(message) = version_conflict(target, &chosen, context) {
            return message;
        }
    }

    // 2. A new target with a missing dependency.
    for id in &context.required_ids {
        if !context.target_ids.contains(id) {
            continue;
        }
        let Some(target) = chosen.get(&id.key()) else {
            continue;
        };
        if let Some(message) = missing_dependency(target, &chosen, context) {
            return message;
        }
    }

    // 3. An installed package whose dependencies went unsatisfied.
    for id in &context.required_ids {
        if context.target_ids.contains(id) {
            continue;
        }
        let Some(package) = chosen.get(&id.key()) else {
            continue;
        };
        if let Some(message) = version_conflict(package, &chosen, context)
            .or_else(|| missing_dependency(package, &chosen, context))
        {
            return message;
        }
    }

    // 4. A transitive package with missing dependencies, nearest to the
    //    required set first, then by id.
    let distances = bfs_distances(best_attempt, &context.required_ids);
    let mut transitive: Vec<&&ResolverPackage> = chosen
        .values()
        .filter(|p| !required.contains(&p.id))
        .collect();
    transitive.sort_by(|a, b| {
        let da = distances.get(&a.id.key()).unwrap_or(&usize::MAX);
        let db = distances.get(&b.id.key()).unwrap_or(&usize::MAX);
        da.cmp(db).then_with(|| a.id.cmp(&b.id))
    });
    for package in transitive {
        if let Some(message) = missing_dependency(package, &chosen, context) {
            return message;
        }
        if let Some(message) = version_conflict(package, &chosen, context) {
            return message;
        }
    }

    "No combination of the available package versions can satisfy every constraint".to_string()
}

fn display_version(package: &ResolverPackage) -> String {
    match package.version {
        Some(ref version) => version.to_string(),
        None => "(absent)".to_string(),
    }
}

/// A dependency of `package` on a chosen package, or of a chosen
/// package on `package`, that the chosen versions cannot satisfy.
fn version_conflict(
    package: &ResolverPackage,
    chosen: &HashMap<String, &ResolverPackage>,
    context: &SolveContext,
) -> Option<String> {
    for dep in live_dependencies(package) {
        if let Some(other) = chosen.get(&dep.library_range.name.key()) {
            if !satisfied_by(dep, other) {
                let message = format!(
                    "'{} {}' is not compatible with '{} {}', which requires '{}'",
                    other.id,
                    display_version(other),
                    package.id,
                    display_version(package),
                    dep.library_range,
                );
                return Some(with_constraint_notes(
                    message,
                    [&package.id, &other.id],
                    context,
                ));
            }
        }
    }
    for other in chosen.values() {
        if other.id == package.id {
            continue;
        }
        for dep in live_dependencies(other) {
            if dep.library_range.name == package.id && !satisfied_by(dep, package) {
                let message = format!(
                    "'{} {}' is not compatible with '{} {}', which requires '{}'",
                    package.id,
                    display_version(package),
                    other.id,
                    display_version(other),
                    dep.library_range,
                );
                return Some(with_constraint_notes(
                    message,
                    [&package.id, &other.id],
                    context,
                ));
            }
        }
    }
    None
}

/// A dependency of `package` that no chosen package provides.
fn missing_dependency(
    package: &ResolverPackage,
    chosen: &HashMap<String, &ResolverPackage>,
    context: &SolveContext,
) -> Option<String> {
    for dep in live_dependencies(package) {
        if !chosen.contains_key(&dep.library_range.name.key()) {
            let message = format!(
                "Unable to find a version of '{}' that satisfies '{} {}', which requires '{}'",
                dep.library_range.name,
                package.id,
                display_version(package),
                dep.library_range,
            );
            return Some(with_constraint_notes(
                message,
                [&package.id, &dep.library_range.name],
                context,
            ));
        }
    }
    None
}

fn live_dependencies(package: &ResolverPackage) -> impl Iterator<Item = &LibraryDependency> {
    package.dependencies.iter().filter(|d| !d.optional)
}

fn satisfied_by(dep: &LibraryDependency, package: &ResolverPackage) -> bool {
    match package.version {
        Some(ref version) => dep.library_range.range.satisfies(version),
        None => false,
    }
}

/// Append a note for every involved id carrying an allowed-version
/// constraint in the installed configuration.
fn with_constraint_notes<'a>(
    mut message: String,
    involved: impl IntoIterator<Item = &'a PackageName>,
    context: &SolveContext,
) -> String {
    for id in involved {
        if let Some(allowed) = context.installed_constraints.get(id) {
            message.push_str(&format!(
                "\nNote: '{id}' has an additional constraint ({allowed}) from the installed package configuration",
            ));
        }
    }
    message
}

/// Shortest dependency-edge distance of every package from the required
/// set, capped at [`MAX_DIAGNOSTIC_DEPTH`].
fn bfs_distances(
    best_attempt: &[ResolverPackage],
    required_ids: &[PackageName],
) -> HashMap<String, usize> {
    let by_id: HashMap<String, &ResolverPackage> = best_attempt
        .iter()
        .filter(|p| !p.absent)
        .map(|p| (p.id.key(), p))
        .collect();

    let mut distances: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<(String, usize)> = required_ids
        .iter()
        .map(|id| (id.key(), 0usize))
        .collect();

    while let Some((key, distance)) = queue.pop_front() {
        if distance > MAX_DIAGNOSTIC_DEPTH || distances.contains_key(&key) {
            continue;
        }
        distances.insert(key.clone(), distance);
        if let Some(package) = by_id.get(&key) {
            for dep in &package.dependencies {
                queue.push_back((dep.library_range.name.key(), distance + 1));
            }
        }
    }
    distances
}
