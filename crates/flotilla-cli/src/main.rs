//! Flotilla CLI - deploy whole Helm environments, one namespace at a time

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::EnvArgs;
use commands::delete::DeleteEnvArgs;
use commands::deploy::{DeployChartArgs, DeployEnvArgs};
use commands::diff::DiffEnvArgs;
use commands::get::GetEnvArgs;
use commands::validate::{ValidateChartsArgs, ValidateEnvArgs};
use error::Result;

#[derive(Parser)]
#[command(name = "flotilla")]
#[command(author = "Flotilla Contributors")]
#[command(version)]
#[command(about = "Deploy, diff and tear down whole Helm environments", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy an environment
    #[command(subcommand)]
    Deploy(DeployTarget),

    /// Delete an environment
    #[command(subcommand)]
    Delete(DeleteTarget),

    /// Lock an environment
    #[command(subcommand)]
    Lock(EnvTarget),

    /// Unlock an environment
    #[command(subcommand)]
    Unlock(EnvTarget),

    /// List the charts deployed in an environment
    #[command(subcommand)]
    Get(GetTarget),

    /// Show chart differences between two environments
    #[command(subcommand)]
    Diff(DiffTarget),

    /// Validate an environment or a chart set
    #[command(subcommand)]
    Validate(ValidateTarget),
}

#[derive(Subcommand)]
enum DeployTarget {
    /// Install, upgrade and remove charts until the namespace matches the charts file
    Env(DeployEnvArgs),

    /// Install or upgrade one chart in an existing environment
    #[command(disable_version_flag = true)]
    Chart(DeployChartArgs),
}

#[derive(Subcommand)]
enum DeleteTarget {
    /// Remove every chart, then the namespace
    Env(DeleteEnvArgs),
}

#[derive(Subcommand)]
enum EnvTarget {
    /// Environment (Kubernetes namespace)
    Env(EnvArgs),
}

#[derive(Subcommand)]
enum GetTarget {
    /// Charts deployed in an environment
    Env(GetEnvArgs),
}

#[derive(Subcommand)]
enum DiffTarget {
    /// Compare two environments
    Env(DiffEnvArgs),
}

#[derive(Subcommand)]
enum ValidateTarget {
    /// Wait until every pod runs and every service has endpoints
    Env(ValidateEnvArgs),

    /// Check a chart set and its dependency graph without a cluster
    Charts(ValidateChartsArgs),
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("flotilla=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "flotilla=info,warn".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Deploy(DeployTarget::Env(args)) => commands::deploy::run(args).await,
        Commands::Deploy(DeployTarget::Chart(args)) => commands::deploy::run_chart(args).await,
        Commands::Delete(DeleteTarget::Env(args)) => commands::delete::run(args).await,
        Commands::Lock(EnvTarget::Env(args)) => commands::lock::run(args).await,
        Commands::Unlock(EnvTarget::Env(args)) => commands::unlock::run(args).await,
        Commands::Get(GetTarget::Env(args)) => commands::get::run(args).await,
        Commands::Diff(DiffTarget::Env(args)) => commands::diff::run(args).await,
        Commands::Validate(ValidateTarget::Env(args)) => commands::validate::run_env(args).await,
        Commands::Validate(ValidateTarget::Charts(args)) => commands::validate::run_charts(args),
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            // Help and version requests print to stdout and succeed
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "flotilla starting");

    if let Err(err) = dispatch(cli.command).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
