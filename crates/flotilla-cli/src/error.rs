//! CLI error types with exit code handling
//!
//! Every library error is folded into a [`CliError`] family that decides the
//! process exit code. Hints embedded in library messages (`\nHint: ...`) are
//! lifted into miette help text.

use miette::Diagnostic;
use thiserror::Error;

use flotilla_core::CoreError;
use flotilla_kube::KubeError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Charts file, override or flag value is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(flotilla::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart dependencies cannot be scheduled
    #[error("Dependency error: {message}")]
    #[diagnostic(code(flotilla::cli::dependency))]
    DependencyGraph {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Environment is held in a state that needs an operator
    #[error("Environment state error: {message}")]
    #[diagnostic(code(flotilla::cli::env_state))]
    EnvironmentState {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Namespace or cluster could not be reached
    #[error("Environment access error: {message}")]
    #[diagnostic(code(flotilla::cli::env_access))]
    EnvironmentAccess {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A release could not be installed or removed
    #[error("Deployment failed: {message}")]
    #[diagnostic(code(flotilla::cli::deployment))]
    Deployment { message: String },

    /// Environment did not become healthy
    #[error("Validation failed: {message}")]
    #[diagnostic(code(flotilla::cli::unhealthy))]
    Unhealthy { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(flotilla::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::DependencyGraph { .. } => exit_codes::DEPENDENCY_ERROR,
            CliError::EnvironmentState { .. } => exit_codes::ENV_STATE_ERROR,
            CliError::EnvironmentAccess { .. } => exit_codes::ENV_ACCESS_ERROR,
            CliError::Deployment { .. } => exit_codes::DEPLOYMENT_ERROR,
            CliError::Unhealthy { .. } => exit_codes::ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }
}

/// Split `message\nHint: help` into its two parts
fn split_hint(full: &str) -> (String, Option<String>) {
    match full.split_once("\nHint: ") {
        Some((message, help)) => (message.to_string(), Some(help.to_string())),
        None => (full.to_string(), None),
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        if let CoreError::UnknownDependency {
            suggestion: Some(suggestion),
            ..
        } = &err
        {
            return CliError::DependencyGraph {
                message,
                help: Some(format!("Did you mean '{}'?", suggestion)),
            };
        }
        if err.is_dependency_graph() {
            CliError::DependencyGraph {
                message,
                help: None,
            }
        } else if err.is_configuration() {
            CliError::Config {
                message,
                help: None,
            }
        } else {
            CliError::Other { message }
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let (message, help) = split_hint(&err.to_string());
        match err {
            KubeError::Core(core) => core.into(),
            KubeError::EnvironmentState { .. } => CliError::EnvironmentState { message, help },
            KubeError::EnvironmentAccess { .. }
            | KubeError::Api(_)
            | KubeError::Kubeconfig(_) => CliError::EnvironmentAccess { message, help },
            KubeError::Deployment { .. } | KubeError::Starved { .. } | KubeError::Backend(_) => {
                CliError::Deployment { message }
            }
            KubeError::InvalidConfig(_) => CliError::Config { message, help },
            KubeError::Unhealthy { .. } => CliError::Unhealthy { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Other {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Other {
            message: format!("Failed to render YAML: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
