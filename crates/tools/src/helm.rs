//! [`ChartClient`] driving the `helm` executable.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use eirenyx_core::{Error, Result};

use crate::chart::{ChartClient, ReleaseInfo, ReleaseRequest};
use crate::config::ToolsConfig;
use crate::profile::Repository;

/// Stderr fragments helm prints when the release does not exist.
const RELEASE_MISSING: [&str; 2] = ["release: not found", "Release not loaded"];

/// Chart client running helm as a child process.
pub struct HelmCli {
    config: ToolsConfig,
}

impl HelmCli {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    /// Seed the repository registry and cache on first use.
    async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.repository_cache).await?;
        if let Some(parent) = self.config.repository_config.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !tokio::fs::try_exists(&self.config.repository_config).await? {
            tokio::fs::write(&self.config.repository_config, b"").await?;
        }
        Ok(())
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "--repository-config".to_string(),
            self.config.repository_config.to_string_lossy().to_string(),
            "--repository-cache".to_string(),
            self.config.repository_cache.to_string_lossy().to_string(),
        ]
    }

    /// Run helm, returning stdout. The child is killed if `cancel` fires first.
    async fn run(&self, operation: &str, args: Vec<String>, cancel: &CancellationToken) -> Result<String> {
        debug!(helm = %self.config.helm_path, args = ?args, "running helm");

        let child = Command::new(&self.config.helm_path)
            .args(&args)
            .args(self.common_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::transient(format!("helm {operation}"), format!("failed to spawn helm: {e}")))?;

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| Error::transient(format!("helm {operation}"), format!("failed to wait for helm: {e}")))?,
            () = cancel.cancelled() => return Err(Error::cancelled(format!("helm {operation}"))),
        };

        if !output.status.success() {
            return Err(classify_failure(
                operation,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn deploy(&self, verb: &str, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()> {
        let values = write_values(request)?;
        let args = release_args(verb, request, &values.path().to_string_lossy());
        self.run(verb, args, cancel).await?;
        info!(release = %request.release, namespace = %request.namespace, chart = %request.chart, "helm {verb} complete");
        Ok(())
    }
}

/// Map helm's stderr to an error kind.
pub fn classify_failure(operation: &str, stderr: &str) -> Error {
    if RELEASE_MISSING.iter().any(|fragment| stderr.contains(fragment)) {
        return Error::release_not_found(stderr.trim());
    }
    Error::transient(format!("helm {operation}"), stderr.trim())
}

/// Arguments for `helm install` / `helm upgrade` with values read from `values_file`.
pub fn release_args(verb: &str, request: &ReleaseRequest, values_file: &str) -> Vec<String> {
    vec![
        verb.to_string(),
        request.release.clone(),
        request.chart.clone(),
        "--namespace".to_string(),
        request.namespace.clone(),
        "--wait".to_string(),
        "--timeout".to_string(),
        timeout_arg(request.timeout),
        "--values".to_string(),
        values_file.to_string(),
    ]
}

/// Arguments for `helm list` matching exactly `release`.
///
/// `--all` includes releases left in a pending or uninstalling state, which
/// the default listing hides.
pub fn list_args(namespace: &str, release: &str) -> Vec<String> {
    vec![
        "list".to_string(),
        "--all".to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--filter".to_string(),
        format!("^{release}$"),
        "--output".to_string(),
        "json".to_string(),
    ]
}

fn timeout_arg(timeout: Duration) -> String {
    format!("{}s", timeout.as_secs())
}

/// Values go through a scratch file removed when the handle drops.
fn write_values(request: &ReleaseRequest) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("eirenyx-values-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(serde_yaml::to_string(&request.values)?.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl ChartClient for HelmCli {
    async fn ensure_repository(&self, repository: &Repository, cancel: &CancellationToken) -> Result<()> {
        self.prepare().await?;
        self.run(
            "repo add",
            vec![
                "repo".to_string(),
                "add".to_string(),
                repository.name.to_string(),
                repository.url.to_string(),
                "--force-update".to_string(),
            ],
            cancel,
        )
        .await?;
        self.run(
            "repo update",
            vec![
                "repo".to_string(),
                "update".to_string(),
                repository.name.to_string(),
            ],
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn release(
        &self,
        namespace: &str,
        release: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ReleaseInfo>> {
        let stdout = self.run("list", list_args(namespace, release), cancel).await?;
        let releases: Vec<ReleaseInfo> = serde_json::from_str(stdout.trim())?;
        Ok(releases.into_iter().find(|info| info.name == release))
    }

    async fn install(&self, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()> {
        self.deploy("install", request, cancel).await
    }

    async fn upgrade(&self, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()> {
        self.deploy("upgrade", request, cancel).await
    }

    async fn uninstall(
        &self,
        namespace: &str,
        release: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            "uninstall",
            vec![
                "uninstall".to_string(),
                release.to_string(),
                "--namespace".to_string(),
                namespace.to_string(),
                "--wait".to_string(),
                "--timeout".to_string(),
                timeout_arg(timeout),
            ],
            cancel,
        )
        .await?;
        info!(release = %release, namespace = %namespace, "helm uninstall complete");
        Ok(())
    }
}
