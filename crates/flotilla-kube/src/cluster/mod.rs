//! Cluster control plane - namespaces, their metadata, and workload status
//!
//! - **Api** (default): a live cluster through `kube::Client`
//! - **Mock**: in-memory, for testing

mod api;
mod mock;

pub use api::KubeControlPlane;
pub use mock::{ControlPlaneCounts, MockControlPlane};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Status of one container in a pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    pub ready: bool,
}

/// Phase and container readiness of one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub phase: String,
    pub containers: Vec<ContainerSummary>,
}

impl PodSummary {
    /// Pod in phase `Running` with every container ready
    pub fn running(name: impl Into<String>, containers: &[&str]) -> Self {
        Self {
            name: name.into(),
            phase: "Running".to_string(),
            containers: containers
                .iter()
                .map(|c| ContainerSummary {
                    name: (*c).to_string(),
                    ready: true,
                })
                .collect(),
        }
    }
}

/// Number of ready addresses behind one service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointsSummary {
    pub name: String,
    pub addresses: usize,
}

/// Namespace-level operations needed to manage environments
///
/// An environment is a namespace; its state lives in namespace annotations.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Whether the namespace exists
    ///
    /// A namespace that exists but is not `Active` (e.g. terminating) is an error.
    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    /// Create the namespace
    async fn create_namespace(&self, name: &str) -> Result<()>;

    /// Delete the namespace
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Current annotations of the namespace
    async fn namespace_annotations(&self, name: &str) -> Result<BTreeMap<String, String>>;

    /// Current labels of the namespace
    async fn namespace_labels(&self, name: &str) -> Result<BTreeMap<String, String>>;

    /// Merge annotations and labels into the namespace metadata
    async fn update_namespace(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Remove a single annotation from the namespace
    async fn remove_namespace_annotation(&self, name: &str, key: &str) -> Result<()>;

    /// Pods in the namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>>;

    /// Service endpoints in the namespace
    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<EndpointsSummary>>;
}
