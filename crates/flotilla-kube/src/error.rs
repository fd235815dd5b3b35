//! Error types for flotilla-kube

use thiserror::Error;

/// Result type for flotilla-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while driving an environment
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be loaded
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// The environment is held in a state that needs an operator
    #[error("environment '{name}' is in state '{state}'\nHint: Inspect the environment, then tear it down with `flotilla delete env --name {name} --force`")]
    EnvironmentState { name: String, state: String },

    /// The environment's namespace could not be read or updated
    #[error("cannot access environment '{name}': {message}")]
    EnvironmentAccess { name: String, message: String },

    /// Installing or removing a single release failed
    #[error("release '{release}' failed: {message}")]
    Deployment { release: String, message: String },

    /// The deployment tool could not be run or returned garbage
    #[error("deployment backend error: {0}")]
    Backend(String),

    /// Releases whose dependencies can never complete
    #[error("releases can never be scheduled, dependencies unresolved: {}", releases.join(", "))]
    Starved { releases: Vec<String> },

    /// Environment did not become healthy
    #[error("environment '{name}' is not healthy: {message}")]
    Unhealthy { name: String, message: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Chart set or dependency graph error
    #[error(transparent)]
    Core(#[from] flotilla_core::CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Wrap an API failure on the namespace backing environment `name`
    pub fn access(name: &str, err: impl std::fmt::Display) -> Self {
        KubeError::EnvironmentAccess {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}
