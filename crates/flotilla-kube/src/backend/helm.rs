//! Helm-backed deployment
//!
//! Charts are pulled from a chart repository into a scratch directory so that
//! values files packaged inside the chart can be layered on the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::ReleaseSpec;
use serde::Deserialize;
use tokio::process::Command;

use super::{DeploymentBackend, InstallOptions};
use crate::error::{KubeError, Result};

/// A chart repository given as `name=url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

impl Repository {
    /// Parse `name=url`
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once('=') {
            Some((name, url)) if !name.is_empty() && !url.is_empty() => Ok(Self {
                name: name.to_string(),
                url: url.to_string(),
            }),
            _ => Err(KubeError::InvalidConfig(format!(
                "repository '{}' must be given as <name>=<url>",
                raw
            ))),
        }
    }
}

/// Deployment backend that shells out to `helm`
#[derive(Debug, Clone)]
pub struct HelmBackend {
    binary: PathBuf,
    kube_context: Option<String>,
    repository: Option<Repository>,
}

/// One entry of `helm list --output json`
#[derive(Debug, Deserialize)]
struct ListedRelease {
    name: String,
    status: String,
    chart: String,
}

impl HelmBackend {
    /// Create a backend for the given kubeconfig context (current context if `None`)
    pub fn new(kube_context: Option<String>) -> Self {
        Self {
            binary: PathBuf::from("helm"),
            kube_context,
            repository: None,
        }
    }

    /// Chart repository to install from
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Use a specific helm binary
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Register the chart repository and refresh the local index
    pub async fn prepare_repository(&self) -> Result<()> {
        let repository = self.repository()?;
        self.exec(&["repo", "add", &repository.name, &repository.url])
            .await?;
        self.exec(&["repo", "update"]).await?;
        tracing::info!(repository = %repository.name, "chart repository ready");
        Ok(())
    }

    fn repository(&self) -> Result<&Repository> {
        self.repository.as_ref().ok_or_else(|| {
            KubeError::InvalidConfig("a chart repository is required to install".to_string())
        })
    }

    fn context_args(&self, args: &mut Vec<String>) {
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
    }

    async fn exec<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        tracing::debug!(binary = %self.binary.display(), args = ?args, "running helm");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                KubeError::Backend(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(KubeError::Backend(format!(
                "helm {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                message
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DeploymentBackend for HelmBackend {
    async fn install_or_upgrade(
        &self,
        release: &ReleaseSpec,
        namespace: &str,
        options: &InstallOptions,
    ) -> Result<()> {
        let failed = |e: KubeError| KubeError::Deployment {
            release: release.release_name.clone(),
            message: e.to_string(),
        };

        let repository = self.repository()?;
        let workdir = tempfile::tempdir()?;
        let workdir_path = workdir.path().to_string_lossy().into_owned();

        self.exec(&[
            "pull",
            &format!("{}/{}", repository.name, release.name),
            "--version",
            &release.version,
            "--untar",
            "-d",
            &workdir_path,
        ])
        .await
        .map_err(failed)?;

        let chart_dir = workdir.path().join(&release.name);
        let chart_path = chart_dir.to_string_lossy().into_owned();
        self.exec(&["dependency", "update", &chart_path])
            .await
            .map_err(failed)?;

        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.release_name.clone(),
            chart_path,
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        self.context_args(&mut args);
        for file in values_chain(&chart_dir, &options.values_files) {
            args.push("-f".to_string());
            args.push(file.to_string_lossy().into_owned());
        }
        args.push("--set".to_string());
        args.push(format!("fullnameOverride={}", release.name));
        for set in &options.set_values {
            args.push("--set".to_string());
            args.push(set.clone());
        }
        args.push("--timeout".to_string());
        args.push(format_timeout(options.timeout));

        self.exec(&args).await.map_err(failed)?;
        Ok(())
    }

    async fn remove(&self, release_name: &str, namespace: &str, timeout: Duration) -> Result<()> {
        let mut args = vec![
            "uninstall".to_string(),
            release_name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        self.context_args(&mut args);
        args.push("--timeout".to_string());
        args.push(format_timeout(timeout));

        self.exec(&args)
            .await
            .map_err(|e| KubeError::Deployment {
                release: release_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn list_installed(
        &self,
        namespace: &str,
        include_failed: bool,
    ) -> Result<Vec<ReleaseSpec>> {
        let mut args = vec![
            "list".to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--all".to_string(),
            "--max".to_string(),
            "0".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        self.context_args(&mut args);

        let output = self.exec(&args).await?;
        parse_list(&output, include_failed)
    }
}

/// Parse `helm list --output json`, keeping deployed (and optionally failed) releases
fn parse_list(output: &str, include_failed: bool) -> Result<Vec<ReleaseSpec>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let listed: Vec<ListedRelease> = serde_json::from_str(output)?;

    let mut releases: Vec<ReleaseSpec> = listed
        .into_iter()
        .filter(|r| r.status == "deployed" || (include_failed && r.status == "failed"))
        .map(|r| {
            let (name, version) = split_chart(&r.chart);
            ReleaseSpec::installed(r.name, name, version)
        })
        .collect();

    releases.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(releases)
}

/// Split helm's `chart` column (`name-version`) into its two parts
///
/// Chart names may contain dashes and even `-<digit>`, so the version starts at
/// the first `-<digit>` whose remainder is a SemVer version. Without one, the
/// first `-<digit>` is used.
pub fn split_chart(chart: &str) -> (&str, &str) {
    let bytes = chart.as_bytes();
    let candidates: Vec<usize> = bytes
        .iter()
        .enumerate()
        .filter(|(index, byte)| {
            **byte == b'-' && bytes.get(index + 1).is_some_and(u8::is_ascii_digit)
        })
        .map(|(index, _)| index)
        .collect();

    let split = candidates
        .iter()
        .copied()
        .find(|index| semver::Version::parse(&chart[index + 1..]).is_ok())
        .or_else(|| candidates.first().copied());

    match split {
        Some(index) => (&chart[..index], &chart[index + 1..]),
        None => (chart, ""),
    }
}

/// Values files to pass with `-f`: the chart's `values.yaml`, then each requested
/// file that exists inside the chart, without repeats
pub fn values_chain(chart_dir: &Path, packed: &[String]) -> Vec<PathBuf> {
    let mut chain: Vec<PathBuf> = Vec::new();

    let defaults = chart_dir.join("values.yaml");
    if defaults.is_file() {
        chain.push(defaults);
    }
    for name in packed {
        let candidate = chart_dir.join(name);
        if candidate.is_file() && !chain.contains(&candidate) {
            chain.push(candidate);
        }
    }
    chain
}

fn format_timeout(timeout: Duration) -> String {
    format!("{}s", timeout.as_secs())
}
