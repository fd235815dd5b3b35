//! Environment lock
//!
//! Advisory mutual exclusion for whole-environment operations, stored as a
//! single annotation on the environment's namespace.
//!
//! ```text
//!   free ──acquire──> busy ──release──> free
//!     │                 │
//!     │                 ├──mark_unknown──> unknown   (install pass failed)
//!     │                 └──mark_failed───> failed    (removal pass failed)
//!     └──mark_for_deletion──> delete
//! ```
//!
//! `delete`, `failed` and `unknown` are never left by `acquire`; they need an
//! operator. The read-then-write in `acquire` is not atomic against another
//! writer: two processes can both observe `free` and both take the lock. The
//! lock is advisory and expected to be driven by one pipeline at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::ControlPlane;
use crate::error::{KubeError, Result};

/// Namespace annotation holding the environment state
pub const STATE_ANNOTATION: &str = "flotilla.io/state";

/// State of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    /// No operation in progress (also the state of an unannotated namespace)
    Free,
    /// A deploy or delete holds the environment
    Busy,
    /// Marked for teardown
    Delete,
    /// A removal pass failed
    Failed,
    /// An install pass failed; releases may be partially deployed
    Unknown,
}

impl EnvironmentState {
    /// Annotation value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Busy => "busy",
            Self::Delete => "delete",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this state blocks `acquire` until an operator intervenes
    pub fn needs_operator(&self) -> bool {
        matches!(self, Self::Delete | Self::Failed | Self::Unknown)
    }
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "free" => Ok(Self::Free),
            "busy" => Ok(Self::Busy),
            "delete" => Ok(Self::Delete),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(other.to_string()),
        }
    }
}

/// Back-off tuning for `acquire`
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Wait after the first `busy` observation
    pub initial_backoff: Duration,
    /// Added to the wait after every further `busy` observation
    pub backoff_step: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(5),
            backoff_step: Duration::from_secs(5),
        }
    }
}

/// State machine over the state annotation of environment namespaces
pub struct EnvironmentLock<C: ControlPlane> {
    control_plane: Arc<C>,
    config: LockConfig,
}

impl<C: ControlPlane> EnvironmentLock<C> {
    pub fn new(control_plane: Arc<C>) -> Self {
        Self::with_config(control_plane, LockConfig::default())
    }

    pub fn with_config(control_plane: Arc<C>, config: LockConfig) -> Self {
        Self {
            control_plane,
            config,
        }
    }

    /// Current state of the environment
    pub async fn state(&self, name: &str) -> Result<EnvironmentState> {
        let annotations = self.control_plane.namespace_annotations(name).await?;
        let raw = annotations
            .get(STATE_ANNOTATION)
            .map(String::as_str)
            .unwrap_or_default();
        raw.parse().map_err(|state| KubeError::EnvironmentState {
            name: name.to_string(),
            state,
        })
    }

    /// Take the environment, waiting with linear back-off while it is busy
    ///
    /// Fails at once if the environment is in a state that needs an operator.
    pub async fn acquire(&self, name: &str) -> Result<()> {
        let mut backoff = self.config.initial_backoff;
        loop {
            let state = self.state(name).await?;
            if state.needs_operator() {
                return Err(state_error(name, state));
            }
            if state == EnvironmentState::Free {
                break;
            }

            tracing::info!(
                environment = %name,
                seconds = backoff.as_secs(),
                "environment busy, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff += self.config.backoff_step;
        }

        self.write(name, EnvironmentState::Busy).await?;
        tracing::info!(environment = %name, "environment locked");
        Ok(())
    }

    /// Hand the environment back
    ///
    /// Only a `free` or `busy` environment can be released; the other states
    /// are left for an operator.
    pub async fn release(&self, name: &str) -> Result<()> {
        let state = self.state(name).await?;
        if state.needs_operator() {
            return Err(state_error(name, state));
        }
        self.write(name, EnvironmentState::Free).await?;
        tracing::info!(environment = %name, "environment unlocked");
        Ok(())
    }

    /// Mark the environment for teardown, taking the lock first unless `force`
    pub async fn mark_for_deletion(&self, name: &str, force: bool) -> Result<()> {
        if !force {
            self.acquire(name).await?;
        }
        self.write(name, EnvironmentState::Delete).await
    }

    /// Record that a removal pass failed
    pub async fn mark_failed(&self, name: &str) -> Result<()> {
        self.write(name, EnvironmentState::Failed).await
    }

    /// Record that an install pass failed
    pub async fn mark_unknown(&self, name: &str) -> Result<()> {
        self.write(name, EnvironmentState::Unknown).await
    }

    /// Drop the state annotation altogether
    pub async fn clear(&self, name: &str) -> Result<()> {
        self.control_plane
            .remove_namespace_annotation(name, STATE_ANNOTATION)
            .await?;
        tracing::debug!(environment = %name, "state annotation removed");
        Ok(())
    }

    async fn write(&self, name: &str, state: EnvironmentState) -> Result<()> {
        let annotations =
            BTreeMap::from([(STATE_ANNOTATION.to_string(), state.as_str().to_string())]);
        self.control_plane
            .update_namespace(name, &annotations, &BTreeMap::new())
            .await?;
        tracing::debug!(environment = %name, state = %state, "state written");
        Ok(())
    }
}

fn state_error(name: &str, state: EnvironmentState) -> KubeError {
    KubeError::EnvironmentState {
        name: name.to_string(),
        state: state.to_string(),
    }
}
