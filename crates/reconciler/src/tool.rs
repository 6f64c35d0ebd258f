//! Tool controller: keeps one chart release per Tool installed and healthy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use eirenyx_api::condition::{READY, set_condition};
use eirenyx_api::{TOOL_FINALIZER, Tool, ToolStatus};
use eirenyx_cluster::ObjectStore;
use eirenyx_core::{Error, Result, ResultExt};
use eirenyx_tools::PackageManager;

use crate::context::Context;
use crate::lifecycle::{Lifecycle, Transition, drive};

pub struct ToolLifecycle<'a> {
    ctx: &'a Context,
}

impl<'a> ToolLifecycle<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    async fn publish(&self, tool: &Tool, status: ToolStatus) -> Result<()> {
        if tool.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let mut updated = tool.clone();
        updated.status = Some(status);
        self.ctx.cluster.tools.replace_status(&updated).await?;
        Ok(())
    }

    async fn record_failure(&self, tool: &Tool, reason: &str, error: &Error) {
        let mut status = tool.status.clone().unwrap_or_default();
        set_condition(
            &mut status.conditions,
            READY,
            false,
            reason,
            error.to_string(),
            tool.metadata.generation,
        );
        self.publish(tool, status)
            .await
            .into_option_logged("failed to record tool failure");
    }
}

#[async_trait]
impl Lifecycle for ToolLifecycle<'_> {
    type Object = Tool;

    fn finalizer(&self) -> &'static str {
        TOOL_FINALIZER
    }

    fn store(&self) -> &dyn ObjectStore<Tool> {
        self.ctx.cluster.tools.as_ref()
    }

    fn enabled(&self, tool: &Tool) -> bool {
        tool.spec.enabled
    }

    fn synced(&self, tool: &Tool) -> bool {
        tool.status
            .as_ref()
            .is_some_and(|status| status.installed && status.healthy)
    }

    async fn cleanup(&self, tool: &Tool) -> Result<()> {
        match self.ctx.packages.ensure_uninstalled(tool, &self.ctx.cancel).await {
            // An unknown type never had a release.
            Err(e) if e.is_terminal() => Ok(()),
            other => other,
        }
    }

    async fn disable(&self, tool: &Tool) -> Result<()> {
        self.cleanup(tool).await?;

        let mut status = ToolStatus {
            conditions: tool
                .status
                .as_ref()
                .map(|s| s.conditions.clone())
                .unwrap_or_default(),
            ..ToolStatus::default()
        };
        set_condition(
            &mut status.conditions,
            READY,
            false,
            "Disabled",
            "tool is disabled",
            tool.metadata.generation,
        );
        self.publish(tool, status).await?;
        info!(tool = %tool.name_any(), "tool disabled");
        Ok(())
    }

    async fn sync(&self, tool: &Tool) -> Result<Option<Duration>> {
        if let Err(e) = PackageManager::validate(tool) {
            self.record_failure(tool, "ValidationFailed", &e).await;
            return Err(e);
        }

        let packages = &self.ctx.packages;
        let cancel = &self.ctx.cancel;
        let outcome = match packages.ensure_installed(tool, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_failure(tool, "InstallFailed", &e).await;
                return Err(e);
            }
        };
        debug!(?outcome, "release applied");

        let healthy = packages.wait_healthy(tool, cancel).await?;
        let version = packages
            .release_version(tool, cancel)
            .await
            .into_option_logged("failed to read release version")
            .flatten();

        let mut status = tool.status.clone().unwrap_or_default();
        status.installed = true;
        status.healthy = healthy;
        status.version = version;
        let (reason, message) = if healthy {
            ("Healthy", "workload is ready")
        } else {
            ("NotReady", "workload is not ready yet")
        };
        set_condition(
            &mut status.conditions,
            READY,
            healthy,
            reason,
            message,
            tool.metadata.generation,
        );
        self.publish(tool, status).await?;

        if healthy {
            Ok(None)
        } else {
            warn!(tool = %tool.name_any(), "tool installed but not healthy");
            Ok(Some(packages.config().poll_timeout))
        }
    }
}

/// Reconcile one Tool.
///
/// # Errors
///
/// Any lifecycle failure; the error policy decides on the retry.
#[instrument(skip(tool, ctx), fields(tool = %tool.name_any(), namespace = ?tool.namespace()))]
pub async fn reconcile_tool(tool: Arc<Tool>, ctx: Arc<Context>) -> Result<Action> {
    let transition = drive(&ToolLifecycle::new(&ctx), &tool)
        .await
        .inspect_error(|e| warn!(error = %e, "tool reconcile failed"))?;
    debug!(?transition, "tool reconciled");

    Ok(match transition {
        Transition::Synced {
            requeue_after: Some(delay),
        } => Action::requeue(delay),
        _ => Action::await_change(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus};
    use kube::api::ObjectMeta;
    use serde_json::json;

    use eirenyx_cluster::MemoryCluster;
    use eirenyx_tools::InMemoryCharts;

    use super::*;
    use crate::tests::{context_with, tool};

    fn ready_falco() -> DaemonSet {
        DaemonSet {
            metadata: ObjectMeta {
                name: Some("falco".to_string()),
                namespace: Some("falco".to_string()),
                ..Default::default()
            },
            status: Some(DaemonSetStatus {
                desired_number_scheduled: 2,
                number_ready: 2,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn step(ctx: &Context, cluster: &MemoryCluster, name: &str) -> Result<Transition> {
        let tool = cluster.tools.get("shop", name).await?.unwrap();
        drive(&ToolLifecycle::new(ctx), &tool).await
    }

    async fn status(cluster: &MemoryCluster, name: &str) -> ToolStatus {
        cluster
            .tools
            .get("shop", name)
            .await
            .unwrap()
            .unwrap()
            .status
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_records_healthy_status() {
        let cluster = MemoryCluster::new();
        let charts = Arc::new(InMemoryCharts::new());
        let ctx = context_with(&cluster, charts.clone());
        cluster.daemon_sets.create(&ready_falco()).await.unwrap();
        cluster.tools.create(&tool("falco")).await.unwrap();

        assert_eq!(step(&ctx, &cluster, "falco").await.unwrap(), Transition::FinalizerAdded);
        assert_eq!(
            step(&ctx, &cluster, "falco").await.unwrap(),
            Transition::Synced { requeue_after: None }
        );

        let status = status(&cluster, "falco").await;
        assert!(status.installed);
        assert!(status.healthy);
        assert_eq!(status.version.as_deref(), Some("1.0.0"));
        assert!(eirenyx_api::condition::is_true(&status.conditions, READY));
        assert!(charts.calls().await.iter().any(|c| c == "install falco/falco"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_tool_requeues() {
        let cluster = MemoryCluster::new();
        let ctx = context_with(&cluster, Arc::new(InMemoryCharts::new()));
        cluster.tools.create(&tool("falco")).await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();

        let transition = step(&ctx, &cluster, "falco").await.unwrap();

        assert_eq!(
            transition,
            Transition::Synced {
                requeue_after: Some(ctx.packages.config().poll_timeout)
            }
        );
        let status = status(&cluster, "falco").await;
        assert!(status.installed);
        assert!(!status.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_failure_is_recorded_and_retried() {
        let cluster = MemoryCluster::new();
        let charts = Arc::new(InMemoryCharts::new());
        let ctx = context_with(&cluster, charts.clone());
        cluster.tools.create(&tool("falco")).await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();

        charts.fail("install").await;
        let err = step(&ctx, &cluster, "falco").await.unwrap_err();

        assert!(err.requeue_after().is_some());
        let status = status(&cluster, "falco").await;
        assert!(!status.installed);
        assert_eq!(status.conditions[0].reason, "InstallFailed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_values_are_terminal() {
        let cluster = MemoryCluster::new();
        let charts = Arc::new(InMemoryCharts::new());
        let ctx = context_with(&cluster, charts.clone());
        let mut invalid = tool("falco");
        invalid.spec.values = Some(json!(["not", "a", "mapping"]));
        cluster.tools.create(&invalid).await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();

        let err = step(&ctx, &cluster, "falco").await.unwrap_err();

        assert_eq!(err.requeue_after(), None);
        assert!(charts.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_uninstalls_then_releases() {
        let cluster = MemoryCluster::new();
        let charts = Arc::new(InMemoryCharts::new());
        let ctx = context_with(&cluster, charts.clone());
        cluster.daemon_sets.create(&ready_falco()).await.unwrap();
        cluster.tools.create(&tool("falco")).await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();

        cluster.tools.delete("shop", "falco").await.unwrap();
        assert_eq!(step(&ctx, &cluster, "falco").await.unwrap(), Transition::Finalized);

        assert!(cluster.tools.get("shop", "falco").await.unwrap().is_none());
        assert!(charts.calls().await.iter().any(|c| c == "uninstall falco/falco"));
        assert!(charts.values("falco", "falco").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_tool_is_uninstalled() {
        let cluster = MemoryCluster::new();
        let charts = Arc::new(InMemoryCharts::new());
        let ctx = context_with(&cluster, charts.clone());
        cluster.daemon_sets.create(&ready_falco()).await.unwrap();
        cluster.tools.create(&tool("falco")).await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();
        step(&ctx, &cluster, "falco").await.unwrap();

        let mut stored = cluster.tools.get("shop", "falco").await.unwrap().unwrap();
        stored.spec.enabled = false;
        cluster.tools.replace(&stored).await.unwrap();

        assert_eq!(step(&ctx, &cluster, "falco").await.unwrap(), Transition::Disabled);
        let status = status(&cluster, "falco").await;
        assert!(!status.installed);
        assert!(!status.healthy);
        assert_eq!(status.version, None);
        assert!(charts.values("falco", "falco").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tool_can_still_be_deleted() {
        let cluster = MemoryCluster::new();
        let ctx = context_with(&cluster, Arc::new(InMemoryCharts::new()));
        cluster.tools.create(&tool("kyverno")).await.unwrap();
        step(&ctx, &cluster, "kyverno").await.unwrap();

        cluster.tools.delete("shop", "kyverno").await.unwrap();
        assert_eq!(step(&ctx, &cluster, "kyverno").await.unwrap(), Transition::Finalized);
        assert!(cluster.tools.get("shop", "kyverno").await.unwrap().is_none());
    }
}
