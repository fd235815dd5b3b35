//! Display formatting for CLI output
//!
//! Renderers return strings so commands decide where they go and tests can
//! snapshot them. Empty input renders as an empty string.

use flotilla_core::{Diff, ReleaseSpec};
use serde::Serialize;

use crate::error::Result;

/// Widest a table column is padded to
const MAX_COLUMN_WIDTH: usize = 60;

/// Output format for `get env`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `charts:` list, the same shape a charts file uses
    #[default]
    Yaml,
    /// Markdown table
    Md,
    /// Aligned plain-text table
    Table,
}

/// Output format for `diff env`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DiffFormat {
    #[default]
    Yaml,
    Table,
}

#[derive(Serialize)]
struct Listing<T> {
    charts: Vec<T>,
}

#[derive(Serialize)]
struct ChartRow<'a> {
    name: &'a str,
    version: &'a str,
}

/// Render installed releases
pub fn render_releases(releases: &[ReleaseSpec], format: OutputFormat) -> Result<String> {
    if releases.is_empty() {
        return Ok(String::new());
    }

    let output = match format {
        OutputFormat::Yaml => {
            let listing = Listing {
                charts: releases
                    .iter()
                    .map(|r| ChartRow {
                        name: &r.name,
                        version: &r.version,
                    })
                    .collect(),
            };
            serde_yaml::to_string(&listing)?
        }
        OutputFormat::Md => {
            let mut out = String::from("| Name | Version |\n|------|---------|\n");
            for r in releases {
                out.push_str(&format!("| {} | {} |\n", r.name, r.version));
            }
            out
        }
        OutputFormat::Table => {
            let mut rows = vec![vec!["NAME".to_string(), "VERSION".to_string()]];
            rows.extend(
                releases
                    .iter()
                    .map(|r| vec![r.name.clone(), r.version.clone()]),
            );
            table(&rows)
        }
    };

    Ok(output)
}

/// One side of a diff, as shown in table headers
#[derive(Debug, Clone)]
pub struct DiffSide<'a> {
    pub kube_context: Option<&'a str>,
    pub name: &'a str,
}

impl DiffSide<'_> {
    /// `context/namespace`, or just the namespace for the current context
    pub fn header(&self) -> String {
        match self.kube_context {
            Some(context) if !context.is_empty() => format!("{}/{}", context, self.name),
            _ => self.name.to_string(),
        }
    }
}

/// Render the differences between two environments
pub fn render_diff(
    diffs: &[Diff],
    left: &DiffSide<'_>,
    right: &DiffSide<'_>,
    format: DiffFormat,
) -> Result<String> {
    if diffs.is_empty() {
        return Ok(String::new());
    }

    let output = match format {
        DiffFormat::Yaml => serde_yaml::to_string(&Listing {
            charts: diffs.to_vec(),
        })?,
        DiffFormat::Table => {
            let mut rows = vec![vec!["chart".to_string(), left.header(), right.header()]];
            rows.extend(diffs.iter().map(|d| {
                vec![
                    d.name.clone(),
                    d.version_left.clone(),
                    d.version_right.clone(),
                ]
            }));
            table(&rows)
        }
    };

    Ok(output)
}

/// Left-aligned columns separated by two spaces
fn table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
                .min(MAX_COLUMN_WIDTH)
        })
        .collect();

    let mut out = String::new();
    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Pluralize a word based on count
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
