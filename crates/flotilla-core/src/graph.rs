//! Dependency graph checks run before anything is deployed

use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::release::ReleaseSpec;

/// Maximum edit distance for a "did you mean" suggestion
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Check that the release set can be scheduled
///
/// Every dependency must name a chart of the set, and the graph must be acyclic.
pub fn validate(releases: &[ReleaseSpec]) -> Result<()> {
    check_dependencies_exist(releases)?;

    let remaining = unresolvable(releases);
    if remaining.is_empty() {
        Ok(())
    } else {
        Err(CoreError::CircularDependency {
            releases: remaining,
        })
    }
}

/// Whether the dependencies between `releases` form a cycle
pub fn has_cycle(releases: &[ReleaseSpec]) -> bool {
    !unresolvable(releases).is_empty()
}

/// Fail on a dependency that names no chart of the set
///
/// Such a release would never become ready and would stall the scheduler.
pub fn check_dependencies_exist(releases: &[ReleaseSpec]) -> Result<()> {
    let names: HashSet<&str> = releases.iter().map(|r| r.name.as_str()).collect();

    for release in releases {
        for dependency in &release.dependencies {
            if !names.contains(dependency.as_str()) {
                return Err(CoreError::UnknownDependency {
                    release: release.name.clone(),
                    dependency: dependency.clone(),
                    suggestion: closest_match(dependency, names.iter().copied()),
                });
            }
        }
    }
    Ok(())
}

/// Peel off releases without dependencies until nothing moves; return what is left
///
/// Works on a copy so the caller's dependency sets are untouched. Dependencies on
/// charts outside the set never resolve and end up in the result too.
fn unresolvable(releases: &[ReleaseSpec]) -> Vec<String> {
    let mut pending: Vec<ReleaseSpec> = releases.to_vec();

    loop {
        let (ready, blocked): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|r| !r.has_dependencies());
        pending = blocked;

        if ready.is_empty() {
            break;
        }
        for done in &ready {
            crate::release::remove_from_dependencies(&mut pending, &done.name);
        }
    }

    let mut names: Vec<String> = pending.into_iter().map(|r| r.name).collect();
    names.sort();
    names
}

fn closest_match<'a>(input: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    candidates
        .map(|candidate| (strsim::levenshtein(input, candidate), candidate))
        .filter(|(distance, _)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, candidate)| candidate.to_string())
}
