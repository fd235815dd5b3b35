//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to read charts file {path}: {source}")]
    ChartsFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse charts file {path}: {source}")]
    ChartsFileParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid charts file {path}: {message}")]
    InvalidChartsFile { path: PathBuf, message: String },

    #[error("Invalid override '{value}': expected <chart>=<version>")]
    InvalidOverride { value: String },

    #[error("Circular dependency found between: {}", releases.join(", "))]
    CircularDependency { releases: Vec<String> },

    #[error("Chart '{release}' depends on '{dependency}' which is not part of the chart set")]
    UnknownDependency {
        release: String,
        dependency: String,
        suggestion: Option<String>,
    },
}

impl CoreError {
    /// Malformed input: unreadable or invalid charts file, or bad override string
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::ChartsFileRead { .. }
                | CoreError::ChartsFileParse { .. }
                | CoreError::InvalidChartsFile { .. }
                | CoreError::InvalidOverride { .. }
        )
    }

    /// The dependency graph itself is broken (cycle or dangling edge)
    pub fn is_dependency_graph(&self) -> bool {
        matches!(
            self,
            CoreError::CircularDependency { .. } | CoreError::UnknownDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
