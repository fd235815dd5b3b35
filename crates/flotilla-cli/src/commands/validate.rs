//! Validate commands - check an environment's health or a chart set offline

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use flotilla_kube::{Environment, ValidationConfig};

use super::EnvArgs;
use crate::display::pluralize;
use crate::error::{CliError, Result};

#[derive(Args, Debug)]
pub struct ValidateEnvArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Health checks performed before giving up
    #[arg(long, default_value_t = 30)]
    pub attempts: u32,

    /// Seconds between health checks
    #[arg(long, default_value_t = 30)]
    pub interval: u64,
}

#[derive(Args, Debug)]
pub struct ValidateChartsArgs {
    /// Charts file(s), merged left to right
    #[arg(
        short = 'c',
        long = "charts-file",
        env = "FLOTILLA_CHARTS_FILE",
        value_delimiter = ','
    )]
    pub charts_files: Vec<PathBuf>,

    /// Override a chart version (chart=version)
    #[arg(long = "override")]
    pub overrides: Vec<String>,

    /// Environment the release names are derived from
    #[arg(short = 'n', long, env = "FLOTILLA_NAME", default_value = "default")]
    pub name: String,
}

/// Wait until every pod runs and every service has endpoints
pub async fn run_env(args: ValidateEnvArgs) -> Result<()> {
    let name = args.env.name.clone();
    println!(
        "{} Validating environment {}",
        style("→").blue().bold(),
        style(&name).cyan()
    );

    let control_plane = args.env.control_plane().await?;
    let environment = Environment::new(&name, control_plane, Arc::new(args.env.helm()));

    let config = ValidationConfig {
        attempts: args.attempts,
        interval: Duration::from_secs(args.interval),
    };
    let report = environment.validate(&config).await?;

    println!(
        "{} Environment {} is healthy ({}, {})",
        style("✓").green().bold(),
        style(&name).cyan(),
        pluralize(report.pods, "pod", "pods"),
        pluralize(report.endpoints, "endpoint", "endpoints")
    );
    Ok(())
}

/// Resolve a chart set and check its dependency graph without a cluster
pub fn run_charts(args: ValidateChartsArgs) -> Result<()> {
    if args.charts_files.is_empty() && args.overrides.is_empty() {
        return Err(CliError::Config {
            message: "no charts to validate".to_string(),
            help: Some("Pass at least one --charts-file or --override".to_string()),
        });
    }

    let releases = flotilla_core::resolve(&args.charts_files, &args.name, &args.overrides)?;
    flotilla_core::validate(&releases)?;

    for release in &releases {
        let depends = if release.has_dependencies() {
            let names: Vec<&str> = release.dependencies.iter().map(String::as_str).collect();
            format!(" depends on {}", names.join(", "))
        } else {
            String::new()
        };
        println!(
            "  {} {}{}",
            release.name,
            style(&release.version).dim(),
            style(depends).dim()
        );
    }

    println!(
        "{} Chart set is valid ({})",
        style("✓").green().bold(),
        pluralize(releases.len(), "chart", "charts")
    );
    Ok(())
}
