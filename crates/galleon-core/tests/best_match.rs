use galleon_core::identity::{LibraryIdentity, LibraryRange};
use galleon_core::range::{best_match, VersionRange};
use galleon_core::version::Version;

fn v(text: &str) -> Version {
    Version::parse(text).unwrap()
}

fn id(name: &str, version: &str) -> LibraryIdentity {
    LibraryIdentity::package(name, v(version))
}

#[test]
fn floor_range_takes_lowest_satisfying_identity() {
    let candidates = [id("lib", "0.9.0"), id("lib", "1.2.0"), id("lib", "1.0.0")];
    let range = VersionRange::parse("1.0.0").unwrap();
    let best = best_match(candidates.iter(), &range, |c| &c.version).unwrap();
    assert_eq!(best.version, v("1.0.0"));
}

#[test]
fn ceiling_only_range_takes_highest_satisfying_identity() {
    let candidates = [id("lib", "1.0.0"), id("lib", "1.9.0"), id("lib", "2.1.0")];
    let range = VersionRange::parse("(, 2.0.0)").unwrap();
    let best = best_match(candidates.iter(), &range, |c| &c.version).unwrap();
    assert_eq!(best.version, v("1.9.0"));
}

#[test]
fn no_satisfying_candidate_yields_none() {
    let candidates = [id("lib", "0.5.0")];
    let range = VersionRange::parse("1.0.0").unwrap();
    assert!(best_match(candidates.iter(), &range, |c| &c.version).is_none());
}

#[test]
fn prerelease_candidates_require_a_floating_range() {
    let candidates = [id("lib", "1.0.0-rc.1"), id("lib", "0.9.0")];

    let plain = VersionRange::parse("0.1.0").unwrap();
    let best = best_match(candidates.iter(), &plain, |c| &c.version).unwrap();
    assert_eq!(best.version, v("0.9.0"));

    let floating = VersionRange::parse("0.1.0-*").unwrap();
    let best = best_match(candidates.iter(), &floating, |c| &c.version).unwrap();
    assert_eq!(best.version, v("0.9.0"));
}

#[test]
fn request_matching_respects_all_three_fields() {
    let request = LibraryRange::new("Lib", VersionRange::parse("[1.0, 2.0)").unwrap());
    assert!(request.matches(&id("lib", "1.5.0")));
    assert!(!request.matches(&id("lib", "2.0.0")));
    assert!(!request.matches(&id("lib2", "1.5.0")));
}
