//! Deployment backends - install, remove and list releases
//!
//! - **Helm** (default): drives the `helm` binary
//! - **Mock**: in-memory, instrumented for tests

mod helm;
mod mock;

pub use helm::{HelmBackend, Repository, split_chart, values_chain};
pub use mock::{BackendEvent, MockBackend};

use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::ReleaseSpec;

use crate::error::Result;

/// Default time allowed for a single install or removal
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-release knobs passed through to the backend on install
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Values files packaged inside the chart to layer on top of `values.yaml`
    pub values_files: Vec<String>,

    /// `key=value` parameter overrides
    pub set_values: Vec<String>,

    /// Time allowed for the operation
    pub timeout: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            values_files: Vec::new(),
            set_values: Vec::new(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Performs the actual work on one release
///
/// Implementations must be Send + Sync: the scheduler calls them from many tasks at once.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Install the release, or upgrade it in place if it already exists
    async fn install_or_upgrade(
        &self,
        release: &ReleaseSpec,
        namespace: &str,
        options: &InstallOptions,
    ) -> Result<()>;

    /// Remove a release
    async fn remove(&self, release_name: &str, namespace: &str, timeout: Duration) -> Result<()>;

    /// Releases currently installed in `namespace`, optionally including failed ones
    async fn list_installed(&self, namespace: &str, include_failed: bool)
    -> Result<Vec<ReleaseSpec>>;
}
