//! Chart sets - the declarative list of charts that make up an environment
//!
//! A charts file is a YAML document with a single `charts` list:
//!
//! ```yaml
//! charts:
//! - name: cassandra
//!   version: 0.4.0
//! - name: mariadb
//!   version: 0.5.4
//! - name: kaa
//!   version: 0.1.7
//!   depends_on:
//!   - cassandra
//!   - mariadb
//! ```
//!
//! Several files can be combined: the first file to mention a chart decides its
//! release name and dependencies, later files only bump its version. Charts a
//! later file introduces are appended. `chart=version` overrides are applied last.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::release::{ReleaseSpec, default_release_name};

/// On-disk representation of a charts file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartsFile {
    #[serde(default)]
    pub charts: Vec<ChartEntry>,
}

/// One record of a charts file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartEntry {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
}

impl ChartsFile {
    /// Load a charts file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ChartsFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse charts file content; `path` is only used for error messages
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let file: Self =
            serde_yaml::from_str(content).map_err(|source| CoreError::ChartsFileParse {
                path: path.to_path_buf(),
                source,
            })?;

        for (index, chart) in file.charts.iter().enumerate() {
            if chart.name.trim().is_empty() {
                return Err(CoreError::InvalidChartsFile {
                    path: path.to_path_buf(),
                    message: format!("chart #{} has an empty name", index + 1),
                });
            }
            if chart.version.trim().is_empty() {
                return Err(CoreError::InvalidChartsFile {
                    path: path.to_path_buf(),
                    message: format!("chart '{}' has an empty version", chart.name),
                });
            }
        }

        Ok(file)
    }

    /// Bind every entry to `environment`
    pub fn into_releases(self, environment: &str) -> Vec<ReleaseSpec> {
        self.charts
            .into_iter()
            .map(|chart| {
                let release_name = chart
                    .release_name
                    .unwrap_or_else(|| default_release_name(environment, &chart.name));
                ReleaseSpec::new(environment, chart.name, chart.version)
                    .with_release_name(release_name)
                    .with_dependencies(chart.depends_on)
            })
            .collect()
    }
}

/// Build the desired release list for `environment`
///
/// Files are merged left to right, then `overrides` (`chart=version`) are applied.
pub fn resolve(
    files: &[PathBuf],
    environment: &str,
    overrides: &[String],
) -> Result<Vec<ReleaseSpec>> {
    let mut merged: IndexMap<String, ReleaseSpec> = IndexMap::new();

    for path in files {
        let releases = ChartsFile::load(path)?.into_releases(environment);
        merge_into(&mut merged, releases);
    }

    let releases = merged.into_values().collect();
    apply_overrides(releases, overrides, environment)
}

/// Releases built from overrides alone
pub fn releases_from_overrides(
    environment: &str,
    overrides: &[String],
) -> Result<Vec<ReleaseSpec>> {
    apply_overrides(Vec::new(), overrides, environment)
}

fn merge_into(merged: &mut IndexMap<String, ReleaseSpec>, releases: Vec<ReleaseSpec>) {
    for release in releases {
        match merged.get_mut(&release.name) {
            Some(existing) => existing.version = release.version,
            None => {
                merged.insert(release.name.clone(), release);
            }
        }
    }
}

/// Apply `chart=version` overrides
///
/// A chart already in the set gets its version replaced in place (release name and
/// dependencies are kept). Any other chart is appended without dependencies.
pub fn apply_overrides(
    mut releases: Vec<ReleaseSpec>,
    overrides: &[String],
    environment: &str,
) -> Result<Vec<ReleaseSpec>> {
    for raw in overrides {
        let (name, version) = parse_override(raw)?;
        match releases.iter_mut().find(|r| r.name == name) {
            Some(existing) => {
                if existing.version != version {
                    existing.version = version.to_string();
                }
            }
            None => releases.push(ReleaseSpec::new(environment, name, version)),
        }
    }
    Ok(releases)
}

/// Split a `chart=version` override
pub fn parse_override(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, version)) if !name.trim().is_empty() && !version.trim().is_empty() => {
            Ok((name.trim(), version.trim()))
        }
        _ => Err(CoreError::InvalidOverride {
            value: raw.to_string(),
        }),
    }
}
