//! Delete command - remove every release and the environment itself

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use flotilla_kube::{DeleteOptions, Environment};

use super::EnvArgs;
use crate::display::pluralize;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct DeleteEnvArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Mark for deletion without waiting for the lock
    #[arg(long, env = "FLOTILLA_FORCE")]
    pub force: bool,

    /// Charts removed at once (0 = unbounded)
    #[arg(short = 'p', long, env = "FLOTILLA_PARALLEL", default_value_t = 1)]
    pub parallel: usize,

    /// Seconds allowed per chart removal
    #[arg(long, env = "FLOTILLA_TIMEOUT", default_value_t = 300)]
    pub timeout: u64,
}

/// Run the delete command
pub async fn run(args: DeleteEnvArgs) -> Result<()> {
    let name = args.env.name.clone();

    println!(
        "{} Deleting environment {}",
        style("→").blue().bold(),
        style(&name).cyan()
    );

    let control_plane = args.env.control_plane().await?;
    let environment = Environment::new(&name, control_plane, Arc::new(args.env.helm()));

    let report = environment
        .delete(&DeleteOptions {
            force: args.force,
            parallel: args.parallel,
            timeout: Duration::from_secs(args.timeout),
        })
        .await?;

    if !report.namespace_existed {
        println!("  Environment {} not found", style(&name).yellow());
    }
    for release in &report.removed {
        println!(
            "  {} {} {}",
            style("-").red(),
            release.name,
            style(&release.version).dim()
        );
    }

    let summary = pluralize(report.removed.len(), "chart removed", "charts removed");
    let outcome = if report.namespace_deleted {
        "deleted"
    } else if report.namespace_existed {
        "emptied, namespace kept"
    } else {
        "cleaned up"
    };
    println!(
        "{} Environment {} {} ({})",
        style("✓").green().bold(),
        style(&name).cyan(),
        outcome,
        summary
    );

    Ok(())
}
