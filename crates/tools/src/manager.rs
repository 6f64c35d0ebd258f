//! Idempotent tool install, upgrade, uninstall and health.

use std::sync::Arc;

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use eirenyx_api::{Kind, Tool};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};

use crate::chart::{ChartClient, ReleaseRequest};
use crate::config::ToolsConfig;
use crate::health::{daemon_set_ready, deployment_ready, poll_until};
use crate::profile::{ToolProfile, Workload};
use crate::values::merged;

/// What `ensure_installed` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Upgraded,
}

/// Package lifecycle manager for [`Tool`] objects.
#[derive(Clone)]
pub struct PackageManager {
    cluster: Cluster,
    charts: Arc<dyn ChartClient>,
    config: ToolsConfig,
}

impl PackageManager {
    pub fn new(cluster: Cluster, charts: Arc<dyn ChartClient>, config: ToolsConfig) -> Self {
        Self {
            cluster,
            charts,
            config,
        }
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    fn profile(tool: &Tool) -> Result<(ToolProfile, String)> {
        let profile = ToolProfile::for_kind(tool.spec.kind()?);
        let namespace = profile
            .namespace_or(tool.spec.namespace.as_deref())
            .to_string();
        Ok((profile, namespace))
    }

    /// Install the tool's chart, or upgrade it when a release already exists.
    #[instrument(skip(self, tool, cancel), fields(tool = %tool.name_any()))]
    pub async fn ensure_installed(&self, tool: &Tool, cancel: &CancellationToken) -> Result<InstallOutcome> {
        let (profile, namespace) = Self::profile(tool)?;

        self.cluster.namespaces.ensure(&namespace).await?;
        self.charts.ensure_repository(&profile.repository, cancel).await?;

        let request = ReleaseRequest {
            release: profile.release.to_string(),
            namespace: namespace.clone(),
            chart: profile.chart.to_string(),
            values: merged(&profile.baseline_values(), tool.spec.values.as_ref()),
            timeout: profile.install_timeout.unwrap_or(self.config.install_timeout),
        };

        match self.charts.release(&namespace, profile.release, cancel).await? {
            Some(existing) if existing.is_pending() => {
                warn!(release = %existing.name, status = %existing.status, "release locked by an unfinished operation");
                Err(Error::not_ready(format!(
                    "release {} in {namespace} is {}",
                    existing.name, existing.status
                )))
            }
            Some(existing) => {
                debug!(revision = %existing.revision, "release present, upgrading");
                self.charts.upgrade(&request, cancel).await?;
                info!(release = %request.release, namespace = %namespace, "tool upgraded");
                Ok(InstallOutcome::Upgraded)
            }
            None => {
                self.charts.install(&request, cancel).await?;
                info!(release = %request.release, namespace = %namespace, "tool installed");
                Ok(InstallOutcome::Installed)
            }
        }
    }

    /// Uninstall the tool's release. A missing release counts as success.
    #[instrument(skip(self, tool, cancel), fields(tool = %tool.name_any()))]
    pub async fn ensure_uninstalled(&self, tool: &Tool, cancel: &CancellationToken) -> Result<()> {
        let (profile, namespace) = Self::profile(tool)?;
        match self
            .charts
            .uninstall(&namespace, profile.release, self.config.uninstall_timeout, cancel)
            .await
        {
            Ok(()) => {
                info!(release = %profile.release, namespace = %namespace, "tool uninstalled");
                Ok(())
            }
            Err(Error::ReleaseNotFound { .. }) => {
                debug!(release = %profile.release, "release already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// One readiness probe of the tool's workload. A missing workload is not healthy.
    pub async fn check_health(&self, tool: &Tool) -> Result<bool> {
        let (profile, namespace) = Self::profile(tool)?;
        match profile.workload {
            Workload::DaemonSet(name) => Ok(self
                .cluster
                .daemon_sets
                .get(&namespace, name)
                .await?
                .is_some_and(|ds| daemon_set_ready(&ds))),
            Workload::Deployment(name) => Ok(self
                .cluster
                .deployments
                .get(&namespace, name)
                .await?
                .is_some_and(|deployment| deployment_ready(&deployment))),
        }
    }

    /// Poll [`Self::check_health`] until healthy or the configured ceiling passes.
    pub async fn wait_healthy(&self, tool: &Tool, cancel: &CancellationToken) -> Result<bool> {
        poll_until(
            self.config.poll_interval,
            self.config.poll_timeout,
            cancel,
            || self.check_health(tool),
        )
        .await
    }

    /// App version of the deployed release.
    pub async fn release_version(&self, tool: &Tool, cancel: &CancellationToken) -> Result<Option<String>> {
        let (profile, namespace) = Self::profile(tool)?;
        Ok(self
            .charts
            .release(&namespace, profile.release, cancel)
            .await?
            .map(|info| info.app_version)
            .filter(|version| !version.is_empty()))
    }

    /// Kind of a tool, as a validation step before any install work.
    pub fn validate(tool: &Tool) -> Result<Kind> {
        let kind = tool.spec.kind()?;
        if let Some(values) = &tool.spec.values {
            if !values.is_null() && !values.is_object() {
                return Err(Error::validation("tool values must be a mapping"));
            }
        }
        Ok(kind)
    }
}
