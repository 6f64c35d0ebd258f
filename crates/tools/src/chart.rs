//! Chart client abstraction and an in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use eirenyx_core::{Error, Result};

use crate::profile::Repository;

/// One install or upgrade of a release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRequest {
    pub release: String,
    pub namespace: String,
    pub chart: String,
    pub values: Value,
    pub timeout: Duration,
}

/// A deployed release as reported by the chart tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
}

impl ReleaseInfo {
    /// An install, upgrade, rollback or uninstall has not finished, or was
    /// interrupted and left the release locked.
    pub fn is_pending(&self) -> bool {
        self.status.starts_with("pending-") || self.status == "uninstalling"
    }
}

/// Chart operations. Every long-running call aborts with `Cancelled` once `cancel` fires.
#[async_trait]
pub trait ChartClient: Send + Sync {
    /// Register the repository and refresh its index.
    async fn ensure_repository(&self, repository: &Repository, cancel: &CancellationToken) -> Result<()>;

    /// The deployed release, `None` when absent.
    async fn release(
        &self,
        namespace: &str,
        release: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ReleaseInfo>>;

    async fn install(&self, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()>;

    async fn upgrade(&self, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()>;

    /// Remove the release. Fails with `ReleaseNotFound` when nothing is deployed.
    async fn uninstall(
        &self,
        namespace: &str,
        release: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// A [`ChartClient`] keeping releases in memory and recording every call.
#[derive(Default)]
pub struct InMemoryCharts {
    releases: Mutex<BTreeMap<(String, String), (ReleaseInfo, Value)>>,
    repositories: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<&'static str>>,
}

impl InMemoryCharts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` fail with a transient error.
    pub async fn fail(&self, operation: &'static str) {
        self.failing.lock().await.insert(operation);
    }

    pub async fn recover(&self, operation: &'static str) {
        self.failing.lock().await.remove(operation);
    }

    /// Operations performed so far, e.g. `install falco/falco`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Values of a deployed release.
    pub async fn values(&self, namespace: &str, release: &str) -> Option<Value> {
        self.releases
            .lock()
            .await
            .get(&(namespace.to_string(), release.to_string()))
            .map(|(_, values)| values.clone())
    }

    /// Overwrite the status of a deployed release, e.g. to leave it `pending-install`.
    pub async fn set_status(&self, namespace: &str, release: &str, status: &str) {
        if let Some((info, _)) = self
            .releases
            .lock()
            .await
            .get_mut(&(namespace.to_string(), release.to_string()))
        {
            info.status = status.to_string();
        }
    }

    pub async fn has_repository(&self, name: &str) -> bool {
        self.repositories.lock().await.contains(name)
    }

    async fn enter(&self, operation: &'static str, target: String, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("helm {operation}")));
        }
        self.calls.lock().await.push(format!("{operation} {target}"));
        if self.failing.lock().await.contains(operation) {
            return Err(Error::transient(format!("helm {operation}"), "injected failure"));
        }
        Ok(())
    }

    async fn deploy(&self, request: &ReleaseRequest) {
        let mut releases = self.releases.lock().await;
        let key = (request.namespace.clone(), request.release.clone());
        let revision = releases
            .get(&key)
            .and_then(|(info, _)| info.revision.parse::<u32>().ok())
            .unwrap_or(0)
            + 1;
        let info = ReleaseInfo {
            name: request.release.clone(),
            namespace: request.namespace.clone(),
            revision: revision.to_string(),
            status: "deployed".to_string(),
            chart: request.chart.clone(),
            app_version: "1.0.0".to_string(),
        };
        releases.insert(key, (info, request.values.clone()));
    }
}

#[async_trait]
impl ChartClient for InMemoryCharts {
    async fn ensure_repository(&self, repository: &Repository, cancel: &CancellationToken) -> Result<()> {
        self.enter("repo", repository.name.to_string(), cancel).await?;
        self.repositories
            .lock()
            .await
            .insert(repository.name.to_string());
        Ok(())
    }

    async fn release(
        &self,
        namespace: &str,
        release: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ReleaseInfo>> {
        self.enter("list", format!("{namespace}/{release}"), cancel).await?;
        Ok(self
            .releases
            .lock()
            .await
            .get(&(namespace.to_string(), release.to_string()))
            .map(|(info, _)| info.clone()))
    }

    async fn install(&self, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()> {
        self.enter("install", format!("{}/{}", request.namespace, request.release), cancel)
            .await?;
        self.deploy(request).await;
        Ok(())
    }

    async fn upgrade(&self, request: &ReleaseRequest, cancel: &CancellationToken) -> Result<()> {
        self.enter("upgrade", format!("{}/{}", request.namespace, request.release), cancel)
            .await?;
        self.deploy(request).await;
        Ok(())
    }

    async fn uninstall(
        &self,
        namespace: &str,
        release: &str,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.enter("uninstall", format!("{namespace}/{release}"), cancel).await?;
        self.releases
            .lock()
            .await
            .remove(&(namespace.to_string(), release.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::release_not_found(release))
    }
}
