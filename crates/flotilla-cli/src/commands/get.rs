//! Get command - list the charts deployed in an environment

use clap::Args;
use flotilla_kube::DeploymentBackend;

use super::EnvArgs;
use crate::display::{OutputFormat, render_releases};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct GetEnvArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Output format
    #[arg(
        short = 'o',
        long,
        env = "FLOTILLA_OUTPUT",
        value_enum,
        default_value_t = OutputFormat::Yaml
    )]
    pub output: OutputFormat,
}

/// Run the get command
pub async fn run(args: GetEnvArgs) -> Result<()> {
    let releases = args
        .env
        .helm()
        .list_installed(&args.env.name, false)
        .await?;

    print!("{}", render_releases(&releases, args.output)?);
    Ok(())
}
