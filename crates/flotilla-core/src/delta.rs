//! Desired vs installed reconciliation

use crate::release::{ReleaseSpec, remove_from_dependencies};

/// Releases of `from` that have no equal counterpart in `to`
///
/// `delta(desired, installed)` yields what to install or upgrade,
/// `delta(installed, desired)` yields what to remove.
///
/// Releases that already match are treated as satisfied: their chart names are
/// stripped from the dependency sets of the returned releases so they do not
/// block anything.
pub fn delta(from: &[ReleaseSpec], to: &[ReleaseSpec]) -> Vec<ReleaseSpec> {
    let mut pending = Vec::new();
    let mut satisfied = Vec::new();

    for release in from {
        if to.contains(release) {
            satisfied.push(release.name.as_str());
        } else {
            pending.push(release.clone());
        }
    }

    for name in satisfied {
        remove_from_dependencies(&mut pending, name);
    }

    pending
}
