//! Diff command - compare the charts deployed in two environments

use clap::Args;
use flotilla_core::diff;
use flotilla_kube::{DeploymentBackend, HelmBackend};

use crate::display::{DiffFormat, DiffSide, render_diff};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct DiffEnvArgs {
    /// Left environment
    #[arg(long, env = "FLOTILLA_NAME_LEFT")]
    pub name_left: String,

    /// Right environment
    #[arg(long, env = "FLOTILLA_NAME_RIGHT")]
    pub name_right: String,

    /// Kubeconfig context of the left environment
    #[arg(long, env = "FLOTILLA_KUBE_CONTEXT_LEFT")]
    pub kube_context_left: Option<String>,

    /// Kubeconfig context of the right environment
    #[arg(long, env = "FLOTILLA_KUBE_CONTEXT_RIGHT")]
    pub kube_context_right: Option<String>,

    /// Output format
    #[arg(
        short = 'o',
        long,
        env = "FLOTILLA_OUTPUT",
        value_enum,
        default_value_t = DiffFormat::Yaml
    )]
    pub output: DiffFormat,
}

/// Run the diff command
pub async fn run(args: DiffEnvArgs) -> Result<()> {
    let left_backend = HelmBackend::new(args.kube_context_left.clone());
    let right_backend = HelmBackend::new(args.kube_context_right.clone());

    let (left, right) = futures::try_join!(
        left_backend.list_installed(&args.name_left, false),
        right_backend.list_installed(&args.name_right, false),
    )?;

    let diffs = diff(&left, &right);
    let output = render_diff(
        &diffs,
        &DiffSide {
            kube_context: args.kube_context_left.as_deref(),
            name: &args.name_left,
        },
        &DiffSide {
            kube_context: args.kube_context_right.as_deref(),
            name: &args.name_right,
        },
        args.output,
    )?;

    print!("{}", output);
    Ok(())
}
