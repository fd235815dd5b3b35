//! Mock control plane for testing
//!
//! Namespaces, pods and endpoints are kept in memory; no cluster is needed.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::{ControlPlane, EndpointsSummary, PodSummary};
use crate::error::{KubeError, Result};

#[derive(Debug, Clone, Default)]
struct MockNamespace {
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    terminating: bool,
    pods: Vec<PodSummary>,
    endpoints: Vec<EndpointsSummary>,
}

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone)]
pub struct ControlPlaneCounts {
    pub creates: usize,
    pub deletes: usize,
    pub reads: usize,
    pub updates: usize,
}

/// In-memory control plane for testing
#[derive(Clone, Default)]
pub struct MockControlPlane {
    namespaces: Arc<RwLock<HashMap<String, MockNamespace>>>,
    operations: Arc<RwLock<ControlPlaneCounts>>,
    unreachable: Arc<RwLock<bool>>,
}

impl MockControlPlane {
    /// Create an empty control plane
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with the given namespaces already present
    pub fn with_namespaces(names: &[&str]) -> Self {
        let plane = Self::new();
        {
            let mut namespaces = plane.namespaces.write().unwrap();
            for name in names {
                namespaces.insert((*name).to_string(), MockNamespace::default());
            }
        }
        plane
    }

    /// Set one annotation directly, bypassing operation counts
    pub fn set_annotation(&self, namespace: &str, key: &str, value: &str) {
        self.namespaces
            .write()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .annotations
            .insert(key.to_string(), value.to_string());
    }

    /// Current annotation value, bypassing operation counts
    pub fn annotation(&self, namespace: &str, key: &str) -> Option<String> {
        self.namespaces
            .read()
            .unwrap()
            .get(namespace)
            .and_then(|ns| ns.annotations.get(key).cloned())
    }

    /// Mark the namespace as terminating
    pub fn set_terminating(&self, namespace: &str) {
        self.namespaces
            .write()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .terminating = true;
    }

    /// Replace the pods of the namespace
    pub fn set_pods(&self, namespace: &str, pods: Vec<PodSummary>) {
        self.namespaces
            .write()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .pods = pods;
    }

    /// Replace the endpoints of the namespace
    pub fn set_endpoints(&self, namespace: &str, endpoints: Vec<EndpointsSummary>) {
        self.namespaces
            .write()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .endpoints = endpoints;
    }

    /// Make every call fail as if the API server could not be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write().unwrap() = unreachable;
    }

    /// Whether the namespace is present, bypassing operation counts
    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.read().unwrap().contains_key(namespace)
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> ControlPlaneCounts {
        self.operations.read().unwrap().clone()
    }

    fn check_reachable(&self, name: &str) -> Result<()> {
        if *self.unreachable.read().unwrap() {
            return Err(KubeError::access(name, "connection refused"));
        }
        Ok(())
    }

    fn with_namespace<T>(&self, name: &str, f: impl FnOnce(&MockNamespace) -> T) -> Result<T> {
        self.check_reachable(name)?;
        self.operations.write().unwrap().reads += 1;
        let namespaces = self.namespaces.read().unwrap();
        namespaces
            .get(name)
            .map(f)
            .ok_or_else(|| KubeError::access(name, "namespace not found"))
    }

    fn with_namespace_mut(&self, name: &str, f: impl FnOnce(&mut MockNamespace)) -> Result<()> {
        self.check_reachable(name)?;
        self.operations.write().unwrap().updates += 1;
        let mut namespaces = self.namespaces.write().unwrap();
        let namespace = namespaces
            .get_mut(name)
            .ok_or_else(|| KubeError::access(name, "namespace not found"))?;
        f(namespace);
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        self.check_reachable(name)?;
        self.operations.write().unwrap().reads += 1;
        match self.namespaces.read().unwrap().get(name) {
            Some(ns) if ns.terminating => Err(KubeError::access(
                name,
                "namespace is in phase 'Terminating'",
            )),
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.check_reachable(name)?;
        self.operations.write().unwrap().creates += 1;
        let mut namespaces = self.namespaces.write().unwrap();
        if namespaces.contains_key(name) {
            return Err(KubeError::access(name, "namespace already exists"));
        }
        namespaces.insert(name.to_string(), MockNamespace::default());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.check_reachable(name)?;
        self.operations.write().unwrap().deletes += 1;
        self.namespaces
            .write()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KubeError::access(name, "namespace not found"))
    }

    async fn namespace_annotations(&self, name: &str) -> Result<BTreeMap<String, String>> {
        self.with_namespace(name, |ns| ns.annotations.clone())
    }

    async fn namespace_labels(&self, name: &str) -> Result<BTreeMap<String, String>> {
        self.with_namespace(name, |ns| ns.labels.clone())
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
        self.with_namespace_mut(name, |ns| {
            ns.annotations.extend(annotations.clone());
            ns.labels.extend(labels.clone());
        })
    }

    async fn remove_namespace_annotation(&self, name: &str, key: &str) -> Result<()> {
        self.with_namespace_mut(name, |ns| {
            ns.annotations.remove(key);
        })
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>> {
        self.with_namespace(namespace, |ns| ns.pods.clone())
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<EndpointsSummary>> {
        self.with_namespace(namespace, |ns| ns.endpoints.clone())
    }
}
