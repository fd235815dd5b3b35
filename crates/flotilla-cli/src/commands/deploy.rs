//! Deploy commands - bring an environment to the desired chart set, or
//! install a single chart into an existing one

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use flotilla_core::ReleaseSpec;
use flotilla_kube::{DeployOptions, Environment, InstallOptions, Repository, ValidationConfig};

use super::EnvArgs;
use crate::display::pluralize;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct DeployEnvArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Charts file(s) describing the environment, merged left to right
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

    /// Chart repository (name=url)
    #[arg(long, env = "FLOTILLA_REPO")]
    pub repo: String,

    /// Values files packaged inside the charts
    #[arg(short = 'f', long = "values")]
    pub values: Vec<String>,

    /// Set values on the command line (key=value)
    #[arg(short = 's', long = "set")]
    pub set: Vec<String>,

    /// Charts deployed at once (0 = unbounded)
    #[arg(short = 'p', long, env = "FLOTILLA_PARALLEL", default_value_t = 1)]
    pub parallel: usize,

    /// Seconds allowed per chart operation
    #[arg(long, env = "FLOTILLA_TIMEOUT", default_value_t = 300)]
    pub timeout: u64,

    /// If the environment exists, deploy only the overrides
    #[arg(short = 'x', long, env = "FLOTILLA_DEPLOY_ONLY_OVERRIDE_IF_ENV_EXISTS")]
    pub deploy_only_override_if_env_exists: bool,
}

#[derive(Args, Debug)]
pub struct DeployChartArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Chart to deploy
    #[arg(long)]
    pub chart: String,

    /// Chart version
    #[arg(long, env = "FLOTILLA_CHART_VERSION")]
    pub version: String,

    /// Release name (defaults to the chart name)
    #[arg(long)]
    pub release_name: Option<String>,

    /// Chart repository (name=url)
    #[arg(long, env = "FLOTILLA_REPO")]
    pub repo: String,

    /// Values files packaged inside the chart
    #[arg(short = 'f', long = "values")]
    pub values: Vec<String>,

    /// Set values on the command line (key=value)
    #[arg(short = 's', long = "set")]
    pub set: Vec<String>,

    /// Seconds allowed for the chart operation
    #[arg(long, env = "FLOTILLA_TIMEOUT", default_value_t = 300)]
    pub timeout: u64,

    /// Wait for the environment to become healthy afterwards
    #[arg(long)]
    pub validate: bool,
}

/// Run the deploy env command
pub async fn run(args: DeployEnvArgs) -> Result<()> {
    let repository = Repository::parse(&args.repo)?;
    let name = args.env.name.clone();

    // Reject a broken chart set before touching helm or the cluster
    let releases = flotilla_core::resolve(&args.charts_files, &name, &args.overrides)?;
    flotilla_core::validate(&releases)?;

    println!(
        "{} Deploying environment {}",
        style("→").blue().bold(),
        style(&name).cyan()
    );

    let backend = args.env.helm().with_repository(repository);
    backend.prepare_repository().await?;

    let control_plane = args.env.control_plane().await?;
    let environment = Environment::new(&name, control_plane, Arc::new(backend));

    let options = DeployOptions {
        charts_files: args.charts_files,
        overrides: args.overrides,
        install: InstallOptions {
            values_files: args.values,
            set_values: args.set,
            timeout: Duration::from_secs(args.timeout),
        },
        parallel: args.parallel,
        deploy_only_override_if_env_exists: args.deploy_only_override_if_env_exists,
    };

    let report = environment.deploy(&options).await?;

    if report.namespace_created {
        println!("  Created namespace {}", style(&name).yellow());
    }
    for release in &report.installed {
        println!(
            "  {} {} {}",
            style("+").green(),
            release.name,
            style(&release.version).dim()
        );
    }
    for release in &report.removed {
        println!(
            "  {} {} {}",
            style("-").red(),
            release.name,
            style(&release.version).dim()
        );
    }

    println!(
        "{} Environment {} deployed ({}, {})",
        style("✓").green().bold(),
        style(&name).cyan(),
        pluralize(report.installed.len(), "chart installed", "charts installed"),
        pluralize(report.removed.len(), "chart removed", "charts removed")
    );

    Ok(())
}

/// Run the deploy chart command
pub async fn run_chart(args: DeployChartArgs) -> Result<()> {
    let repository = Repository::parse(&args.repo)?;
    let name = args.env.name.clone();
    let release_name = args.release_name.unwrap_or_else(|| args.chart.clone());
    let release =
        ReleaseSpec::new(&name, &args.chart, &args.version).with_release_name(release_name);

    println!(
        "{} Deploying {} {} to {}",
        style("→").blue().bold(),
        release.name,
        style(&release.version).dim(),
        style(&name).cyan()
    );

    let backend = args.env.helm().with_repository(repository);
    backend.prepare_repository().await?;

    let control_plane = args.env.control_plane().await?;
    let environment = Environment::new(&name, control_plane, Arc::new(backend));

    let install = InstallOptions {
        values_files: args.values,
        set_values: args.set,
        timeout: Duration::from_secs(args.timeout),
    };
    environment.deploy_chart(&release, &install).await?;

    println!(
        "{} Release {} deployed to {}",
        style("✓").green().bold(),
        release.release_name,
        style(&name).cyan()
    );

    if args.validate {
        let report = environment.validate(&ValidationConfig::default()).await?;
        println!(
            "{} Environment {} is healthy ({}, {})",
            style("✓").green().bold(),
            style(&name).cyan(),
            pluralize(report.pods, "pod", "pods"),
            pluralize(report.endpoints, "endpoint", "endpoints")
        );
    }

    Ok(())
}
