//! CLI commands

pub mod delete;
pub mod deploy;
pub mod diff;
pub mod get;
pub mod lock;
pub mod unlock;
pub mod validate;

use std::sync::Arc;

use clap::Args;
use flotilla_kube::{HelmBackend, KubeControlPlane};

use crate::error::Result;

/// Arguments naming one environment
#[derive(Args, Debug, Clone)]
pub struct EnvArgs {
    /// Name of the environment (Kubernetes namespace)
    #[arg(short = 'n', long, env = "FLOTILLA_NAME")]
    pub name: String,

    /// Kubeconfig context to use (defaults to the current context)
    #[arg(long, env = "FLOTILLA_KUBE_CONTEXT")]
    pub kube_context: Option<String>,
}

impl EnvArgs {
    /// Connect to the cluster this environment lives in
    pub async fn control_plane(&self) -> Result<Arc<KubeControlPlane>> {
        let plane = KubeControlPlane::connect(self.kube_context.as_deref()).await?;
        Ok(Arc::new(plane))
    }

    /// Helm backend bound to the same context
    pub fn helm(&self) -> HelmBackend {
        HelmBackend::new(self.kube_context.clone())
    }
}
