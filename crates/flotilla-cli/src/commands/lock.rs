//! Lock command - mark an environment busy

use console::style;
use flotilla_kube::{ControlPlane, EnvironmentLock};

use super::EnvArgs;
use crate::error::Result;

/// Run the lock command
///
/// Waits with back-off while another operation holds the environment.
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
        .acquire(&args.name)
        .await?;

    println!(
        "{} Locked environment {}",
        style("✓").green().bold(),
        style(&args.name).cyan()
    );
    Ok(())
}
