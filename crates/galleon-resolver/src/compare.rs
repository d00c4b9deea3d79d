//! Preference ordering for combinatorial search candidates.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use galleon_core::identity::PackageName;
use galleon_core::version::Version;

use crate::solve::ResolverPackage;

/// Which version of a dependency to prefer when several satisfy the
/// constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyBehavior {
    #[default]
    Lowest,
    HighestPatch,
    HighestMinor,
    Highest,
    /// Dependencies are not followed at all.
    Ignore,
}

/// Orders the candidates within one id group; the resulting order is
/// the search order for that slot.
pub struct ResolverComparer<'a> {
    behavior: DependencyBehavior,
    preferred: &'a HashMap<PackageName, Version>,
    targets: &'a HashSet<PackageName>,
    required: &'a HashSet<PackageName>,
}

impl<'a> ResolverComparer<'a> {
    pub fn new(
        behavior: DependencyBehavior,
        preferred: &'a HashMap<PackageName, Version>,
        targets: &'a HashSet<PackageName>,
        required: &'a HashSet<PackageName>,
    ) -> Self {
        Self {
            behavior,
            preferred,
            targets,
            required,
        }
    }

    pub fn compare(&self, a: &ResolverPackage, b: &ResolverPackage) -> Ordering {
        if a.absent || b.absent {
            return self.compare_absent(a, b);
        }
        let (Some(va), Some(vb)) = (a.version.as_ref(), b.version.as_ref()) else {
            return Ordering::Equal;
        };

        // An already-installed package prefers to stay at its version;
        // new targets follow the behavior instead.
        if !self.targets.contains(&a.id) {
            if let Some(preferred) = self.preferred.get(&a.id) {
                match (va == preferred, vb == preferred) {
                    (true, false) => return Ordering::Less,
                    (false, true) => return Ordering::Greater,
                    _ => {}
                }
            }
        }

        let by_behavior = match self.behavior {
            DependencyBehavior::Lowest => va.cmp(vb),
            DependencyBehavior::Highest | DependencyBehavior::Ignore => vb.cmp(va),
            DependencyBehavior::HighestPatch => (va.major, va.minor)
                .cmp(&(vb.major, vb.minor))
                .then_with(|| vb.cmp(va)),
            DependencyBehavior::HighestMinor => {
                va.major.cmp(&vb.major).then_with(|| vb.cmp(va))
            }
        };

        by_behavior
            .then_with(|| b.listed.cmp(&a.listed))
            .then_with(|| a.id.cmp(&b.id))
    }

    fn compare_absent(&self, a: &ResolverPackage, b: &ResolverPackage) -> Ordering {
        if a.absent == b.absent {
            return Ordering::Equal;
        }
        let absent_id = if a.absent { &a.id } else { &b.id };
        // Omitting an optional id is preferred only when dependencies
        // are ignored altogether.
        let absent_first =
            !self.required.contains(absent_id) && self.behavior == DependencyBehavior::Ignore;
        match (a.absent, absent_first) {
            (true, true) | (false, false) => Ordering::Less,
            (true, false) | (false, true) => Ordering::Greater,
        }
    }
}
