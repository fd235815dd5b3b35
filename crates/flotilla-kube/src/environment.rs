//! Environment orchestration - deploy and delete whole environments
//!
//! An environment is one namespace. Deploys and deletes hold the environment
//! lock for their whole duration and never leave it `busy`: every exit path
//! either releases it or marks it `unknown` / `failed` for an operator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flotilla_core::{ReleaseSpec, delta, releases_from_overrides, resolve, validate};

use crate::backend::{DEFAULT_OPERATION_TIMEOUT, DeploymentBackend, InstallOptions};
use crate::cluster::ControlPlane;
use crate::error::{KubeError, Result};
use crate::lock::{EnvironmentLock, LockConfig};
use crate::scheduler::schedule;
use crate::validation::{HealthReport, ValidationConfig, wait_until_healthy};

/// Namespaces that are emptied but never deleted
pub const PROTECTED_NAMESPACES: &[&str] = &["default", "kube-system", "kube-public"];

/// Options for a deploy
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Chart-set files, merged left to right
    pub charts_files: Vec<PathBuf>,

    /// `chart=version` overrides
    pub overrides: Vec<String>,

    /// Passed to the backend for every install
    pub install: InstallOptions,

    /// Releases acted on at once (0 = unbounded)
    pub parallel: usize,

    /// When the environment already exists, deploy only the overrides and
    /// skip the removal pass
    pub deploy_only_override_if_env_exists: bool,
}

/// What a deploy changed
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub namespace_created: bool,
    pub installed: Vec<ReleaseSpec>,
    pub removed: Vec<ReleaseSpec>,
}

/// Options for a delete
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Skip taking the lock before marking for deletion
    pub force: bool,

    /// Releases acted on at once (0 = unbounded)
    pub parallel: usize,

    /// Time allowed per removal
    pub timeout: Duration,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            force: false,
            parallel: 1,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// What a delete changed
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub namespace_existed: bool,
    pub removed: Vec<ReleaseSpec>,
    pub namespace_deleted: bool,
}

/// One environment on one cluster
pub struct Environment<C: ControlPlane, B: DeploymentBackend> {
    name: String,
    control_plane: Arc<C>,
    backend: Arc<B>,
    lock: EnvironmentLock<C>,
}

impl<C, B> Environment<C, B>
where
    C: ControlPlane + 'static,
    B: DeploymentBackend + 'static,
{
    pub fn new(name: impl Into<String>, control_plane: Arc<C>, backend: Arc<B>) -> Self {
        Self::with_lock_config(name, control_plane, backend, LockConfig::default())
    }

    pub fn with_lock_config(
        name: impl Into<String>,
        control_plane: Arc<C>,
        backend: Arc<B>,
        config: LockConfig,
    ) -> Self {
        let lock = EnvironmentLock::with_config(Arc::clone(&control_plane), config);
        Self {
            name: name.into(),
            control_plane,
            backend,
            lock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The environment's lock, for explicit lock and unlock
    pub fn lock(&self) -> &EnvironmentLock<C> {
        &self.lock
    }

    /// Whether the environment's namespace exists
    pub async fn exists(&self) -> Result<bool> {
        self.control_plane.namespace_exists(&self.name).await
    }

    /// Releases currently deployed
    pub async fn installed(&self) -> Result<Vec<ReleaseSpec>> {
        self.backend.list_installed(&self.name, false).await
    }

    /// Install or upgrade a single chart, outside of any chart set
    ///
    /// The environment lock is not taken and the namespace must already exist.
    pub async fn deploy_chart(
        &self,
        release: &ReleaseSpec,
        options: &InstallOptions,
    ) -> Result<()> {
        if !self.exists().await? {
            return Err(KubeError::EnvironmentAccess {
                name: self.name.clone(),
                message: "namespace does not exist".to_string(),
            });
        }

        tracing::info!(
            chart = %release.name,
            version = %release.version,
            release = %release.release_name,
            environment = %self.name,
            "deploying chart"
        );
        self.backend
            .install_or_upgrade(release, &self.name, options)
            .await?;
        tracing::info!(release = %release.release_name, "deployed chart");
        Ok(())
    }

    /// Bring the environment to the desired chart set
    pub async fn deploy(&self, options: &DeployOptions) -> Result<DeployReport> {
        if options.overrides.is_empty() {
            if options.charts_files.is_empty() {
                return Err(KubeError::InvalidConfig(
                    "either a charts file or an override has to be given".to_string(),
                ));
            }
            if options.deploy_only_override_if_env_exists {
                return Err(KubeError::InvalidConfig(
                    "an override has to be given when deploying only overrides".to_string(),
                ));
            }
        }

        let full = resolve(&options.charts_files, &self.name, &options.overrides)?;
        validate(&full)?;

        let pre_existing = self.exists().await?;
        if !pre_existing {
            self.control_plane.create_namespace(&self.name).await?;
            tracing::info!(environment = %self.name, "created environment");
        }

        let desired = if pre_existing && options.deploy_only_override_if_env_exists {
            releases_from_overrides(&self.name, &options.overrides)?
        } else {
            full
        };

        self.lock.acquire(&self.name).await?;

        let installed = match self.backend.list_installed(&self.name, false).await {
            Ok(installed) => installed,
            Err(e) => {
                self.recover(self.lock.release(&self.name).await);
                return Err(e);
            }
        };

        let to_install = delta(&desired, &installed);
        if let Err(e) = self.install_all(to_install.clone(), options).await {
            self.recover(self.lock.mark_unknown(&self.name).await);
            return Err(e);
        }

        let mut removed = Vec::new();
        if !options.deploy_only_override_if_env_exists {
            let installed = match self.backend.list_installed(&self.name, false).await {
                Ok(installed) => installed,
                Err(e) => {
                    self.recover(self.lock.mark_unknown(&self.name).await);
                    return Err(e);
                }
            };

            removed = delta(&installed, &desired);
            if let Err(e) = self
                .remove_all(removed.clone(), options.parallel, options.install.timeout)
                .await
            {
                self.recover(self.lock.mark_failed(&self.name).await);
                return Err(e);
            }
        }

        self.lock.release(&self.name).await?;

        Ok(DeployReport {
            namespace_created: !pre_existing,
            installed: to_install,
            removed,
        })
    }

    /// Remove every release and the namespace itself
    ///
    /// Protected namespaces are emptied and have their state cleared instead.
    pub async fn delete(&self, options: &DeleteOptions) -> Result<DeleteReport> {
        let existed = self.exists().await?;
        if existed {
            self.lock
                .mark_for_deletion(&self.name, options.force)
                .await?;
        } else {
            tracing::info!(environment = %self.name, "environment not found");
        }

        let releases = self.backend.list_installed(&self.name, true).await?;
        if let Err(e) = self
            .remove_all(releases.clone(), options.parallel, options.timeout)
            .await
        {
            if existed {
                self.recover(self.lock.mark_failed(&self.name).await);
            }
            return Err(e);
        }

        let mut namespace_deleted = false;
        if existed {
            if PROTECTED_NAMESPACES.contains(&self.name.as_str()) {
                self.lock.clear(&self.name).await?;
            } else {
                self.control_plane.delete_namespace(&self.name).await?;
                namespace_deleted = true;
            }
        }
        tracing::info!(environment = %self.name, "deleted environment");

        Ok(DeleteReport {
            namespace_existed: existed,
            removed: releases,
            namespace_deleted,
        })
    }

    /// Retry health checks until the environment is healthy or attempts run out
    pub async fn validate(&self, config: &ValidationConfig) -> Result<HealthReport> {
        wait_until_healthy(self.control_plane.as_ref(), &self.name, config).await
    }

    async fn install_all(
        &self,
        releases: Vec<ReleaseSpec>,
        options: &DeployOptions,
    ) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let namespace = self.name.clone();
        let install = options.install.clone();

        schedule(releases, options.parallel, move |release| {
            let backend = Arc::clone(&backend);
            let namespace = namespace.clone();
            let install = install.clone();
            async move {
                tracing::info!(
                    chart = %release.name,
                    version = %release.version,
                    environment = %namespace,
                    "deploying chart"
                );
                let result = backend
                    .install_or_upgrade(&release, &namespace, &install)
                    .await;
                if result.is_ok() {
                    tracing::info!(
                        chart = %release.name,
                        version = %release.version,
                        "deployed chart"
                    );
                }
                result
            }
        })
        .await
    }

    async fn remove_all(
        &self,
        releases: Vec<ReleaseSpec>,
        parallel: usize,
        timeout: Duration,
    ) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let namespace = self.name.clone();

        schedule(releases, parallel, move |release| {
            let backend = Arc::clone(&backend);
            let namespace = namespace.clone();
            async move {
                tracing::info!(
                    release = %release.release_name,
                    environment = %namespace,
                    "deleting release"
                );
                let result = backend
                    .remove(&release.release_name, &namespace, timeout)
                    .await;
                if result.is_ok() {
                    tracing::info!(release = %release.release_name, "deleted release");
                }
                result
            }
        })
        .await
    }

    /// Log a failed lock transition on an error path; the original error wins
    fn recover(&self, transition: Result<()>) {
        if let Err(e) = transition {
            tracing::warn!(
                environment = %self.name,
                error = %e,
                "could not update environment state after failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::cluster::MockControlPlane;
    use crate::lock::{EnvironmentState, STATE_ANNOTATION};
    use std::io::Write;

    const CHARTS: &str = r#"
charts:
  - name: cassandra
    version: 0.4.0
  - name: mariadb
    version: 0.5.4
  - name: kaa
    version: 0.1.7
    depends_on:
      - cassandra
      - mariadb
"#;

    struct Fixture {
        plane: Arc<MockControlPlane>,
        backend: Arc<MockBackend>,
        env: Environment<MockControlPlane, MockBackend>,
        dir: tempfile::TempDir,
        charts: PathBuf,
    }

    fn fixture(plane: MockControlPlane, backend: MockBackend) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let charts = dir.path().join("charts.yaml");
        let mut file = std::fs::File::create(&charts).unwrap();
        file.write_all(CHARTS.as_bytes()).unwrap();

        let plane = Arc::new(plane);
        let backend = Arc::new(backend);
        let env = Environment::new("dev", Arc::clone(&plane), Arc::clone(&backend));
        Fixture {
            plane,
            backend,
            env,
            dir,
            charts,
        }
    }

    fn deploy_options(fx: &Fixture) -> DeployOptions {
        DeployOptions {
            charts_files: vec![fx.charts.clone()],
            parallel: 1,
            ..Default::default()
        }
    }

    fn state(fx: &Fixture) -> Option<String> {
        fx.plane.annotation("dev", STATE_ANNOTATION)
    }

    #[tokio::test]
    async fn test_deploy_chart_installs_one_release() {
        let backend = MockBackend::new()
            .with_deployed("dev", vec![ReleaseSpec::new("dev", "cassandra", "0.4.0")]);
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);
        let release = ReleaseSpec::new("dev", "kaa", "0.1.7").with_release_name("kaa");

        fx.env
            .deploy_chart(&release, &InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(fx.backend.installs(), vec!["kaa"]);
        assert_eq!(fx.backend.deployed("dev").len(), 2);
        assert_eq!(state(&fx), None);
    }

    #[tokio::test]
    async fn test_deploy_chart_needs_namespace() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());
        let release = ReleaseSpec::new("dev", "kaa", "0.1.7");

        let result = fx.env.deploy_chart(&release, &InstallOptions::default()).await;

        assert!(matches!(result, Err(KubeError::EnvironmentAccess { .. })));
        assert!(fx.backend.installs().is_empty());
        assert!(!fx.plane.contains("dev"));
    }

    #[tokio::test]
    async fn test_deploy_chart_failure_is_deployment_error() {
        let backend = MockBackend::new();
        backend.fail_release("kaa");
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);
        let release = ReleaseSpec::new("dev", "kaa", "0.1.7").with_release_name("kaa");

        let result = fx.env.deploy_chart(&release, &InstallOptions::default()).await;

        assert!(matches!(result, Err(KubeError::Deployment { .. })));
    }

    #[tokio::test]
    async fn test_deploy_creates_environment() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());

        let report = fx.env.deploy(&deploy_options(&fx)).await.unwrap();

        assert!(report.namespace_created);
        assert_eq!(report.installed.len(), 3);
        assert!(report.removed.is_empty());
        assert_eq!(fx.backend.installs().last().map(String::as_str), Some("dev-kaa"));
        assert_eq!(state(&fx).as_deref(), Some("free"));
    }

    #[tokio::test]
    async fn test_deploy_reconciles() {
        let backend = MockBackend::new().with_deployed(
            "dev",
            vec![
                ReleaseSpec::new("dev", "cassandra", "0.4.0"),
                ReleaseSpec::new("dev", "mariadb", "0.5.3"),
                ReleaseSpec::new("dev", "redis", "5.0.0"),
            ],
        );
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);

        let report = fx.env.deploy(&deploy_options(&fx)).await.unwrap();

        assert!(!report.namespace_created);
        assert_eq!(fx.backend.installs(), vec!["dev-mariadb", "dev-kaa"]);
        assert_eq!(fx.backend.removals(), vec!["dev-redis"]);
        let names: Vec<_> = fx.backend.deployed("dev").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["cassandra", "kaa", "mariadb"]);
        assert_eq!(state(&fx).as_deref(), Some("free"));
    }

    #[tokio::test]
    async fn test_deploy_is_idempotent() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());
        fx.env.deploy(&deploy_options(&fx)).await.unwrap();

        let report = fx.env.deploy(&deploy_options(&fx)).await.unwrap();

        assert!(report.installed.is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(fx.backend.installs().len(), 3);
    }

    #[tokio::test]
    async fn test_deploy_only_override_on_existing_environment() {
        let backend = MockBackend::new().with_deployed(
            "dev",
            vec![
                ReleaseSpec::new("dev", "cassandra", "0.4.0"),
                ReleaseSpec::new("dev", "redis", "5.0.0"),
            ],
        );
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);
        let options = DeployOptions {
            overrides: vec!["kaa=7.1.0".to_string()],
            deploy_only_override_if_env_exists: true,
            ..deploy_options(&fx)
        };

        let report = fx.env.deploy(&options).await.unwrap();

        assert_eq!(fx.backend.installs(), vec!["dev-kaa"]);
        assert!(fx.backend.removals().is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(state(&fx).as_deref(), Some("free"));
    }

    #[tokio::test]
    async fn test_deploy_only_override_on_new_environment_deploys_all() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());
        let options = DeployOptions {
            overrides: vec!["kaa=7.1.0".to_string()],
            deploy_only_override_if_env_exists: true,
            ..deploy_options(&fx)
        };

        fx.env.deploy(&options).await.unwrap();

        let kaa = fx
            .backend
            .deployed("dev")
            .into_iter()
            .find(|r| r.name == "kaa")
            .unwrap();
        assert_eq!(kaa.version, "7.1.0");
        assert_eq!(fx.backend.installs().len(), 3);
    }

    #[tokio::test]
    async fn test_deploy_argument_errors() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());

        let nothing = DeployOptions::default();
        assert!(matches!(
            fx.env.deploy(&nothing).await,
            Err(KubeError::InvalidConfig(_))
        ));

        let no_override = DeployOptions {
            deploy_only_override_if_env_exists: true,
            ..deploy_options(&fx)
        };
        assert!(matches!(
            fx.env.deploy(&no_override).await,
            Err(KubeError::InvalidConfig(_))
        ));
        assert!(!fx.plane.contains("dev"));
    }

    #[tokio::test]
    async fn test_deploy_cycle_has_no_side_effects() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());
        let cyclic = fx.dir.path().join("cyclic.yaml");
        std::fs::write(
            &cyclic,
            "charts:\n  - name: a\n    version: '1'\n    depends_on: [b]\n  - name: b\n    version: '1'\n    depends_on: [a]\n",
        )
        .unwrap();
        let options = DeployOptions {
            charts_files: vec![cyclic],
            ..Default::default()
        };

        let result = fx.env.deploy(&options).await;

        assert!(matches!(
            result,
            Err(KubeError::Core(flotilla_core::CoreError::CircularDependency { .. }))
        ));
        assert!(!fx.plane.contains("dev"));
        assert!(fx.backend.installs().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_refuses_failed_environment() {
        let plane = MockControlPlane::with_namespaces(&["dev"]);
        plane.set_annotation("dev", STATE_ANNOTATION, "failed");
        let fx = fixture(plane, MockBackend::new());

        let result = fx.env.deploy(&deploy_options(&fx)).await;

        assert!(matches!(result, Err(KubeError::EnvironmentState { .. })));
        assert!(fx.backend.installs().is_empty());
        assert_eq!(state(&fx).as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn test_install_failure_marks_unknown() {
        let backend = MockBackend::new();
        backend.fail_release("dev-mariadb");
        let fx = fixture(MockControlPlane::new(), backend);

        let result = fx.env.deploy(&deploy_options(&fx)).await;

        assert!(matches!(result, Err(KubeError::Deployment { .. })));
        assert!(!fx.backend.installs().contains(&"dev-kaa".to_string()));
        assert_eq!(state(&fx).as_deref(), Some("unknown"));
        assert_eq!(
            fx.env.lock().state("dev").await.unwrap(),
            EnvironmentState::Unknown
        );
    }

    #[tokio::test]
    async fn test_removal_failure_marks_failed() {
        let backend = MockBackend::new()
            .with_deployed("dev", vec![ReleaseSpec::new("dev", "redis", "5.0.0")]);
        backend.fail_release("dev-redis");
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);

        let result = fx.env.deploy(&deploy_options(&fx)).await;

        assert!(matches!(result, Err(KubeError::Deployment { release, .. }) if release == "dev-redis"));
        assert_eq!(state(&fx).as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn test_listing_failure_releases_lock() {
        let backend = MockBackend::new();
        backend.fail_listing(true);
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);

        let result = fx.env.deploy(&deploy_options(&fx)).await;

        assert!(matches!(result, Err(KubeError::Backend(_))));
        assert_eq!(state(&fx).as_deref(), Some("free"));
    }

    #[tokio::test]
    async fn test_delete_environment() {
        let backend = MockBackend::new()
            .with_deployed("dev", vec![ReleaseSpec::new("dev", "kaa", "0.1.7")])
            .with_failed("dev", vec![ReleaseSpec::new("dev", "redis", "5.0.0")]);
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);

        let report = fx.env.delete(&DeleteOptions::default()).await.unwrap();

        assert!(report.namespace_existed);
        assert!(report.namespace_deleted);
        assert_eq!(report.removed.len(), 2);
        assert!(!fx.plane.contains("dev"));
        assert!(fx.backend.list_installed("dev", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_protected_namespace_clears_state() {
        let plane = MockControlPlane::with_namespaces(&["default"]);
        let backend = MockBackend::new()
            .with_deployed("default", vec![ReleaseSpec::new("default", "kaa", "0.1.7")]);
        let plane = Arc::new(plane);
        let env = Environment::new("default", Arc::clone(&plane), Arc::new(backend));

        let report = env.delete(&DeleteOptions::default()).await.unwrap();

        assert!(!report.namespace_deleted);
        assert!(plane.contains("default"));
        assert_eq!(plane.annotation("default", STATE_ANNOTATION), None);
    }

    #[tokio::test]
    async fn test_delete_missing_namespace() {
        let fx = fixture(MockControlPlane::new(), MockBackend::new());

        let report = fx.env.delete(&DeleteOptions::default()).await.unwrap();

        assert!(!report.namespace_existed);
        assert!(!report.namespace_deleted);
        assert_eq!(fx.plane.operation_counts().deletes, 0);
    }

    #[tokio::test]
    async fn test_delete_failed_environment_needs_force() {
        let plane = MockControlPlane::with_namespaces(&["dev"]);
        plane.set_annotation("dev", STATE_ANNOTATION, "failed");
        let fx = fixture(plane, MockBackend::new());

        assert!(matches!(
            fx.env.delete(&DeleteOptions::default()).await,
            Err(KubeError::EnvironmentState { .. })
        ));
        assert!(fx.plane.contains("dev"));

        let forced = DeleteOptions {
            force: true,
            ..Default::default()
        };
        fx.env.delete(&forced).await.unwrap();
        assert!(!fx.plane.contains("dev"));
    }

    #[tokio::test]
    async fn test_delete_removal_failure_marks_failed() {
        let backend = MockBackend::new()
            .with_deployed("dev", vec![ReleaseSpec::new("dev", "kaa", "0.1.7")]);
        backend.fail_release("dev-kaa");
        let fx = fixture(MockControlPlane::with_namespaces(&["dev"]), backend);

        assert!(fx.env.delete(&DeleteOptions::default()).await.is_err());
        assert_eq!(state(&fx).as_deref(), Some("failed"));
        assert!(fx.plane.contains("dev"));
    }
}
