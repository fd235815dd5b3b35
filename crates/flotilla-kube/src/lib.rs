//! Flotilla Kube - deploying environments onto Kubernetes
//!
//! This crate provides:
//! - **Scheduler**: dependency-aware, bounded-concurrency execution of release actions
//! - **Environment Lock**: advisory state machine on a namespace annotation
//! - **Environment**: deploy and delete flows tying the two together
//! - **Validation**: pod and endpoint health checks with retry
//! - **Backends**: Helm (via the `helm` binary) and an instrumented in-memory mock
//! - **Control planes**: a live cluster (via `kube`) and an in-memory mock

pub mod backend;
pub mod cluster;
pub mod environment;
pub mod error;
pub mod lock;
pub mod scheduler;
pub mod validation;

pub use backend::{
    BackendEvent, DEFAULT_OPERATION_TIMEOUT, DeploymentBackend, HelmBackend, InstallOptions,
    MockBackend, Repository,
};
pub use cluster::{
    ContainerSummary, ControlPlane, EndpointsSummary, KubeControlPlane, MockControlPlane,
    PodSummary,
};
pub use environment::{
    DeleteOptions, DeleteReport, DeployOptions, DeployReport, Environment, PROTECTED_NAMESPACES,
};
pub use error::{KubeError, Result};
pub use lock::{EnvironmentLock, EnvironmentState, LockConfig, STATE_ANNOTATION};
pub use scheduler::schedule;
pub use validation::{HealthProblem, HealthReport, ValidationConfig};
