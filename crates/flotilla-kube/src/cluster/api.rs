//! Control plane backed by a live Kubernetes cluster

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use serde_json::json;

use super::{ContainerSummary, ControlPlane, EndpointsSummary, PodSummary};
use crate::error::{KubeError, Result};

/// Control plane talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    /// Connect using the given kubeconfig context, or the current one if `None`
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                let config = Config::from_kubeconfig(&options).await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self { client })
    }

    /// Create with an existing Kubernetes client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    async fn namespace_meta(&self, name: &str) -> Result<ObjectMeta> {
        let namespace = self
            .namespaces()
            .get(name)
            .await
            .map_err(|e| KubeError::access(name, e))?;
        Ok(namespace.metadata)
    }

    async fn merge_metadata(&self, name: &str, metadata: serde_json::Value) -> Result<()> {
        self.namespaces()
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "metadata": metadata })),
            )
            .await
            .map_err(|e| KubeError::access(name, e))?;
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let namespace = self
            .namespaces()
            .get_opt(name)
            .await
            .map_err(|e| KubeError::access(name, e))?;

        let Some(namespace) = namespace else {
            return Ok(false);
        };

        let phase = namespace
            .status
            .and_then(|s| s.phase)
            .unwrap_or_else(|| "Active".to_string());
        if phase != "Active" {
            return Err(KubeError::access(
                name,
                format!("namespace is in phase '{}'", phase),
            ));
        }
        Ok(true)
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.namespaces()
            .create(&PostParams::default(), &namespace)
            .await
            .map_err(|e| KubeError::access(name, e))?;
        tracing::info!(namespace = %name, "namespace created");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| KubeError::access(name, e))?;
        tracing::info!(namespace = %name, "namespace deleted");
        Ok(())
    }

    async fn namespace_annotations(&self, name: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.namespace_meta(name).await?.annotations.unwrap_or_default())
    }

    async fn namespace_labels(&self, name: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.namespace_meta(name).await?.labels.unwrap_or_default())
    }

    async fn update_namespace(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        if annotations.is_empty() && labels.is_empty() {
            return Ok(());
        }

        let mut metadata = serde_json::Map::new();
        if !annotations.is_empty() {
            metadata.insert("annotations".to_string(), json!(annotations));
        }
        if !labels.is_empty() {
            metadata.insert("labels".to_string(), json!(labels));
        }
        self.merge_metadata(name, serde_json::Value::Object(metadata))
            .await
    }

    async fn remove_namespace_annotation(&self, name: &str, key: &str) -> Result<()> {
        // A null value removes the key under JSON merge patch semantics
        self.merge_metadata(name, json!({ "annotations": { key: null } }))
            .await
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| KubeError::access(namespace, e))?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| {
                let status = pod.status.unwrap_or_default();
                PodSummary {
                    name: pod.metadata.name.unwrap_or_default(),
                    phase: status.phase.unwrap_or_else(|| "Unknown".to_string()),
                    containers: status
                        .container_statuses
                        .unwrap_or_default()
                        .into_iter()
                        .map(|c| ContainerSummary {
                            name: c.name,
                            ready: c.ready,
                        })
                        .collect(),
                }
            })
            .collect())
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<EndpointsSummary>> {
        let endpoints: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let list = endpoints
            .list(&ListParams::default())
            .await
            .map_err(|e| KubeError::access(namespace, e))?;

        Ok(list
            .items
            .into_iter()
            .map(|ep| EndpointsSummary {
                name: ep.metadata.name.unwrap_or_default(),
                addresses: ep
                    .subsets
                    .unwrap_or_default()
                    .iter()
                    .map(|s| s.addresses.as_ref().map_or(0, Vec::len))
                    .sum(),
            })
            .collect())
    }
}
