//! Unlock command - mark an environment free

use console::style;
use flotilla_kube::{ControlPlane, EnvironmentLock};

use super::EnvArgs;
use crate::error::Result;

/// Run the unlock command
///
/// An environment left `failed` or `unknown` is not unlocked; it has to be
/// inspected and deleted with `--force`.
pub async fn run(args: EnvArgs) -> Result<()> {
    let control_plane = args.control_plane().await?;
    if !control_plane.namespace_exists(&args.name).await? {
        println!(
            "{} Environment {} not found",
            style("!").yellow().bold(),
            style(&args.name).cyan()
        );
        return Ok(());
    }

    EnvironmentLock::new(control_plane)
        .release(&args.name)
        .await?;

    println!(
        "{} Unlocked environment {}",
        style("✓").green().bold(),
        style(&args.name).cyan()
    );
    Ok(())
}
