//! Release model - one chart bound to one environment

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One deployable unit: a chart at a version, installed under a release name
///
/// Identity is `(release_name, name, version)`. The dependency set is not part
/// of equality: it is working state that shrinks as dependencies complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSpec {
    /// Name of the installed release (`{environment}-{chart}` unless overridden)
    pub release_name: String,

    /// Chart name
    pub name: String,

    /// Chart version
    pub version: String,

    /// Charts that must be fully deployed before this one may start
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,
}

impl ReleaseSpec {
    /// Create a release with the default release name for `environment`
    pub fn new(
        environment: &str,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            release_name: default_release_name(environment, &name),
            name,
            version: version.into(),
            dependencies: BTreeSet::new(),
        }
    }

    /// Create a release from an explicit release name (as reported by a backend)
    pub fn installed(
        release_name: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            release_name: release_name.into(),
            name: name.into(),
            version: version.into(),
            dependencies: BTreeSet::new(),
        }
    }

    /// Set the charts this release depends on
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Override the release name
    pub fn with_release_name(mut self, release_name: impl Into<String>) -> Self {
        self.release_name = release_name.into();
        self
    }

    /// Whether any dependency is still outstanding
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Mark `name` as satisfied. Returns true if it was a dependency.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        self.dependencies.remove(name)
    }
}

impl PartialEq for ReleaseSpec {
    fn eq(&self, other: &Self) -> bool {
        self.release_name == other.release_name
            && self.name == other.name
            && self.version == other.version
    }
}

impl Eq for ReleaseSpec {}

impl Hash for ReleaseSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.release_name.hash(state);
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for ReleaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.release_name, self.name, self.version)
    }
}

/// Release name used when a chart set does not specify one
pub fn default_release_name(environment: &str, chart: &str) -> String {
    format!("{}-{}", environment, chart)
}

/// Remove `name` from the dependency set of every release
pub fn remove_from_dependencies(releases: &mut [ReleaseSpec], name: &str) {
    for release in releases.iter_mut() {
        release.remove_dependency(name);
    }
}
