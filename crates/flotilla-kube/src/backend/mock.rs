//! Mock deployment backend for testing
//!
//! Keeps installed releases in memory and records when each operation starts
//! and finishes, so tests can check ordering and parallelism.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flotilla_core::ReleaseSpec;

use super::{DeploymentBackend, InstallOptions};
use crate::error::{KubeError, Result};

/// Operation boundary recorded by [`MockBackend`], keyed by release name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Started(String),
    Finished(String),
}

#[derive(Debug, Default)]
struct MockState {
    /// namespace -> deployed releases
    deployed: HashMap<String, Vec<ReleaseSpec>>,
    /// namespace -> releases left in a failed state
    failed: HashMap<String, Vec<ReleaseSpec>>,
    events: Vec<BackendEvent>,
    installs: Vec<String>,
    removals: Vec<String>,
    lists: usize,
    in_flight: usize,
    max_in_flight: usize,
    failing: HashSet<String>,
    fail_listing: bool,
    delay: Duration,
}

/// In-memory deployment backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every install and removal for `delay` before completing
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = delay;
        self
    }

    /// Pre-populate deployed releases in `namespace`
    pub fn with_deployed(self, namespace: &str, releases: Vec<ReleaseSpec>) -> Self {
        self.state
            .lock()
            .unwrap()
            .deployed
            .entry(namespace.to_string())
            .or_default()
            .extend(releases);
        self
    }

    /// Pre-populate releases left in a failed state in `namespace`
    pub fn with_failed(self, namespace: &str, releases: Vec<ReleaseSpec>) -> Self {
        self.state
            .lock()
            .unwrap()
            .failed
            .entry(namespace.to_string())
            .or_default()
            .extend(releases);
        self
    }

    /// Make every operation on `release_name` fail
    pub fn fail_release(&self, release_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(release_name.to_string());
    }

    /// Make `list_installed` fail
    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    /// Deployed releases in `namespace`, sorted by chart name
    pub fn deployed(&self, namespace: &str) -> Vec<ReleaseSpec> {
        let state = self.state.lock().unwrap();
        let mut releases = state.deployed.get(namespace).cloned().unwrap_or_default();
        releases.sort_by(|a, b| a.name.cmp(&b.name));
        releases
    }

    /// Every start and finish, in the order they happened
    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Release names installed, in call order
    pub fn installs(&self) -> Vec<String> {
        self.state.lock().unwrap().installs.clone()
    }

    /// Release names removed, in call order
    pub fn removals(&self) -> Vec<String> {
        self.state.lock().unwrap().removals.clone()
    }

    /// Number of `list_installed` calls
    pub fn list_count(&self) -> usize {
        self.state.lock().unwrap().lists
    }

    /// Highest number of operations that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    fn begin(&self, release_name: &str) -> Duration {
        let mut state = self.state.lock().unwrap();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        state
            .events
            .push(BackendEvent::Started(release_name.to_string()));
        state.delay
    }

    fn end(&self, release_name: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        state
            .events
            .push(BackendEvent::Finished(release_name.to_string()));
        !state.failing.contains(release_name)
    }

    async fn run(&self, release_name: &str) -> Result<()> {
        let delay = self.begin(release_name);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.end(release_name) {
            Ok(())
        } else {
            Err(KubeError::Deployment {
                release: release_name.to_string(),
                message: "mock failure".to_string(),
            })
        }
    }
}

#[async_trait]
impl DeploymentBackend for MockBackend {
    async fn install_or_upgrade(
        &self,
        release: &ReleaseSpec,
        namespace: &str,
        _options: &InstallOptions,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .installs
            .push(release.release_name.clone());

        self.run(&release.release_name).await?;

        let mut state = self.state.lock().unwrap();
        let deployed = state.deployed.entry(namespace.to_string()).or_default();
        deployed.retain(|r| r.release_name != release.release_name);
        deployed.push(ReleaseSpec::installed(
            release.release_name.clone(),
            release.name.clone(),
            release.version.clone(),
        ));
        Ok(())
    }

    async fn remove(&self, release_name: &str, namespace: &str, _timeout: Duration) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .removals
            .push(release_name.to_string());

        self.run(release_name).await?;

        let mut state = self.state.lock().unwrap();
        if let Some(deployed) = state.deployed.get_mut(namespace) {
            deployed.retain(|r| r.release_name != release_name);
        }
        if let Some(failed) = state.failed.get_mut(namespace) {
            failed.retain(|r| r.release_name != release_name);
        }
        Ok(())
    }

    async fn list_installed(
        &self,
        namespace: &str,
        include_failed: bool,
    ) -> Result<Vec<ReleaseSpec>> {
        let mut state = self.state.lock().unwrap();
        state.lists += 1;
        if state.fail_listing {
            return Err(KubeError::Backend("mock listing failure".to_string()));
        }

        let mut releases = state.deployed.get(namespace).cloned().unwrap_or_default();
        if include_failed {
            releases.extend(state.failed.get(namespace).cloned().unwrap_or_default());
        }
        releases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_replaces_by_release_name() {
        let backend = MockBackend::new();
        let options = InstallOptions::default();

        backend
            .install_or_upgrade(&ReleaseSpec::new("dev", "kaa", "1.0"), "dev", &options)
            .await
            .unwrap();
        backend
            .install_or_upgrade(&ReleaseSpec::new("dev", "kaa", "2.0"), "dev", &options)
            .await
            .unwrap();

        assert_eq!(
            backend.list_installed("dev", false).await.unwrap(),
            vec![ReleaseSpec::new("dev", "kaa", "2.0")]
        );
        assert_eq!(backend.installs(), vec!["dev-kaa", "dev-kaa"]);
    }

    #[tokio::test]
    async fn test_failed_releases_only_listed_on_request() {
        let backend = MockBackend::new()
            .with_deployed("dev", vec![ReleaseSpec::new("dev", "kaa", "1.0")])
            .with_failed("dev", vec![ReleaseSpec::new("dev", "redis", "5.0")]);

        assert_eq!(backend.list_installed("dev", false).await.unwrap().len(), 1);
        assert_eq!(backend.list_installed("dev", true).await.unwrap().len(), 2);

        backend
            .remove("dev-redis", "dev", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(backend.list_installed("dev", true).await.unwrap().len(), 1);
        assert_eq!(backend.list_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_release() {
        let backend = MockBackend::new();
        backend.fail_release("dev-kaa");

        let result = backend
            .install_or_upgrade(
                &ReleaseSpec::new("dev", "kaa", "1.0"),
                "dev",
                &InstallOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(KubeError::Deployment { .. })));
        assert!(backend.deployed("dev").is_empty());
        assert_eq!(
            backend.events(),
            vec![
                BackendEvent::Started("dev-kaa".to_string()),
                BackendEvent::Finished("dev-kaa".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let backend = MockBackend::new();
        backend.fail_listing(true);
        assert!(backend.list_installed("dev", false).await.is_err());
    }
}
