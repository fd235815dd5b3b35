//! Version differences between two environments

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::release::ReleaseSpec;

/// A chart whose version differs between the left and right environment
///
/// A side where the chart is not installed has an empty version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub name: String,
    pub version_left: String,
    pub version_right: String,
}

impl Diff {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version_left: String::new(),
            version_right: String::new(),
        }
    }
}

/// Compare two installed sets by chart name, sorted by chart name
pub fn diff(left: &[ReleaseSpec], right: &[ReleaseSpec]) -> Vec<Diff> {
    let mut merged: BTreeMap<&str, Diff> = BTreeMap::new();

    for release in left {
        merged
            .entry(release.name.as_str())
            .or_insert_with(|| Diff::new(&release.name))
            .version_left = release.version.clone();
    }
    for release in right {
        merged
            .entry(release.name.as_str())
            .or_insert_with(|| Diff::new(&release.name))
            .version_right = release.version.clone();
    }

    merged
        .into_values()
        .filter(|d| d.version_left != d.version_right)
        .collect()
}
