//! Environment validation
//!
//! An environment is healthy when every pod is `Running`, every container is
//! ready, and every service endpoint has at least one address.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::cluster::ControlPlane;
use crate::error::{KubeError, Result};

/// Retry tuning for [`wait_until_healthy`]
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Checks performed before giving up
    pub attempts: u32,
    /// Wait between checks
    pub interval: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(30),
        }
    }
}

/// Why an environment is not healthy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HealthProblem {
    PodNotRunning { pod: String, phase: String },
    ContainerNotReady { pod: String, container: String },
    NoEndpointAddresses { endpoints: String },
}

impl fmt::Display for HealthProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PodNotRunning { pod, phase } => {
                write!(f, "pod {} is in phase \"{}\"", pod, phase)
            }
            Self::ContainerNotReady { pod, container } => {
                write!(f, "container {}/{} is not ready", pod, container)
            }
            Self::NoEndpointAddresses { endpoints } => {
                write!(f, "endpoints {} have no addresses", endpoints)
            }
        }
    }
}

/// Outcome of one health check
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub pods: usize,
    pub endpoints: usize,
    pub problems: Vec<HealthProblem>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check pods and endpoints of `namespace` once
pub async fn check_environment<C: ControlPlane + ?Sized>(
    control_plane: &C,
    namespace: &str,
) -> Result<HealthReport> {
    let pods = control_plane.list_pods(namespace).await?;
    let endpoints = control_plane.list_endpoints(namespace).await?;

    let mut problems = Vec::new();
    for pod in &pods {
        if pod.phase != "Running" {
            problems.push(HealthProblem::PodNotRunning {
                pod: pod.name.clone(),
                phase: pod.phase.clone(),
            });
        }
    }
    for pod in &pods {
        for container in pod.containers.iter().filter(|c| !c.ready) {
            problems.push(HealthProblem::ContainerNotReady {
                pod: pod.name.clone(),
                container: container.name.clone(),
            });
        }
    }
    for ep in endpoints.iter().filter(|ep| ep.addresses == 0) {
        problems.push(HealthProblem::NoEndpointAddresses {
            endpoints: ep.name.clone(),
        });
    }

    for problem in &problems {
        tracing::debug!(environment = %namespace, "{}", problem);
    }

    Ok(HealthReport {
        pods: pods.len(),
        endpoints: endpoints.len(),
        problems,
    })
}

/// Check repeatedly until healthy
///
/// Access errors end the wait at once. Still unhealthy after the last attempt
/// is [`KubeError::Unhealthy`].
pub async fn wait_until_healthy<C: ControlPlane + ?Sized>(
    control_plane: &C,
    namespace: &str,
    config: &ValidationConfig,
) -> Result<HealthReport> {
    let attempts = config.attempts.max(1);
    let mut attempt = 1;
    loop {
        let report = check_environment(control_plane, namespace).await?;
        if report.is_healthy() {
            return Ok(report);
        }
        if attempt >= attempts {
            let message = report
                .problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(KubeError::Unhealthy {
                name: namespace.to_string(),
                message,
            });
        }

        tracing::info!(
            environment = %namespace,
            attempt,
            attempts,
            problems = report.problems.len(),
            "environment validation failed, will retry in {} seconds",
            config.interval.as_secs()
        );
        tokio::time::sleep(config.interval).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ContainerSummary, EndpointsSummary, MockControlPlane, PodSummary};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn endpoints(name: &str, addresses: usize) -> EndpointsSummary {
        EndpointsSummary {
            name: name.to_string(),
            addresses,
        }
    }

    #[tokio::test]
    async fn test_healthy_environment() {
        let plane = MockControlPlane::with_namespaces(&["dev"]);
        plane.set_pods("dev", vec![PodSummary::running("kaa-0", &["kaa"])]);
        plane.set_endpoints("dev", vec![endpoints("kaa", 1)]);

        let report = check_environment(&plane, "dev").await.unwrap();

        assert!(report.is_healthy());
        assert_eq!(report.pods, 1);
        assert_eq!(report.endpoints, 1);
    }

    #[tokio::test]
    async fn test_problems_are_reported() {
        let plane = MockControlPlane::with_namespaces(&["dev"]);
        plane.set_pods(
            "dev",
            vec![
                PodSummary {
                    name: "mariadb-0".to_string(),
                    phase: "Pending".to_string(),
                    containers: vec![],
                },
                PodSummary {
                    name: "kaa-0".to_string(),
                    phase: "Running".to_string(),
                    containers: vec![
                        ContainerSummary {
                            name: "kaa".to_string(),
                            ready: true,
                        },
                        ContainerSummary {
                            name: "sidecar".to_string(),
                            ready: false,
                        },
                    ],
                },
            ],
        );
        plane.set_endpoints("dev", vec![endpoints("kaa", 2), endpoints("mariadb", 0)]);

        let report = check_environment(&plane, "dev").await.unwrap();

        let problems: Vec<String> = report.problems.iter().map(ToString::to_string).collect();
        assert_eq!(
            problems,
            vec![
                "pod mariadb-0 is in phase \"Pending\"",
                "container kaa-0/sidecar is not ready",
                "endpoints mariadb have no addresses",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_attempts() {
        let plane = MockControlPlane::with_namespaces(&["dev"]);
        plane.set_endpoints("dev", vec![endpoints("kaa", 0)]);
        let config = ValidationConfig {
            attempts: 3,
            interval: Duration::from_secs(30),
        };
        let start = Instant::now();

        let result = wait_until_healthy(&plane, "dev", &config).await;

        assert!(matches!(result, Err(KubeError::Unhealthy { .. })));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_recovered() {
        let plane = Arc::new(MockControlPlane::with_namespaces(&["dev"]));
        plane.set_endpoints("dev", vec![endpoints("kaa", 0)]);

        let fixer = Arc::clone(&plane);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            fixer.set_endpoints("dev", vec![endpoints("kaa", 1)]);
        });

        let report = wait_until_healthy(plane.as_ref(), "dev", &ValidationConfig::default())
            .await
            .unwrap();

        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_access_error_is_not_retried() {
        let plane = MockControlPlane::with_namespaces(&["dev"]);
        plane.set_unreachable(true);

        let result = wait_until_healthy(&plane, "dev", &ValidationConfig::default()).await;

        assert!(matches!(result, Err(KubeError::EnvironmentAccess { .. })));
    }
}
