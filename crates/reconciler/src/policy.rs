//! Policy controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use eirenyx_api::condition::{READY, set_condition};
use eirenyx_api::{POLICY_FINALIZER, Policy, PolicyPhase, PolicyReport, PolicyStatus, Tool};
use eirenyx_cluster::ObjectStore;
use eirenyx_core::{Error, Result, ResultExt};
use eirenyx_policy::{Engine, PolicyEngine};

use crate::context::Context;
use crate::lifecycle::{Lifecycle, Transition, drive};

/// Policy hooks for the lifecycle state machine.
pub struct PolicyLifecycle<'a> {
    ctx: &'a Context,
}

impl<'a> PolicyLifecycle<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    fn engine(&self, policy: &Policy) -> Result<PolicyEngine> {
        PolicyEngine::for_policy(policy, self.ctx.cluster.clone())
    }

    /// Create the report if absent, or point it at the current generation.
    async fn ensure_report(&self, desired: PolicyReport) -> Result<String> {
        let namespace = desired.namespace().unwrap_or_default();
        let name = desired.name_any();
        let reports = &self.ctx.cluster.reports;

        match reports.get(&namespace, &name).await? {
            None => {
                reports.create(&desired).await?;
                info!(report = %name, "report created");
            }
            Some(mut existing) if existing.spec != desired.spec => {
                existing.spec = desired.spec;
                reports.replace(&existing).await?;
                debug!(report = %name, "report moved to new generation");
            }
            Some(_) => {}
        }
        Ok(name)
    }

    async fn publish(&self, policy: &Policy, status: PolicyStatus) -> Result<()> {
        if policy.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let mut updated = policy.clone();
        updated.status = Some(status);
        self.ctx.cluster.policies.replace_status(&updated).await?;
        Ok(())
    }

    /// Record a failure on the status. Never fails the caller.
    async fn record_failure(&self, policy: &Policy, phase: Option<PolicyPhase>, reason: &str, error: &Error) {
        let mut status = policy.status.clone().unwrap_or_default();
        if phase.is_some() {
            status.phase = phase;
        }
        set_condition(
            &mut status.conditions,
            READY,
            false,
            reason,
            error.to_string(),
            Some(policy.generation()),
        );
        self.publish(policy, status)
            .await
            .into_option_logged("failed to record policy failure");
    }
}

#[async_trait]
impl Lifecycle for PolicyLifecycle<'_> {
    type Object = Policy;

    fn finalizer(&self) -> &'static str {
        POLICY_FINALIZER
    }

    fn store(&self) -> &dyn ObjectStore<Policy> {
        self.ctx.cluster.policies.as_ref()
    }

    fn enabled(&self, policy: &Policy) -> bool {
        policy.spec.enabled
    }

    fn linked(&self, policy: &Policy) -> Option<bool> {
        let tool_kind = Tool::kind(&());
        Some(
            policy
                .owner_references()
                .iter()
                .any(|owner| owner.kind == tool_kind && owner.name == policy.spec.policy_type),
        )
    }

    fn synced(&self, policy: &Policy) -> bool {
        policy.status.as_ref().is_some_and(|status| {
            status.phase == Some(PolicyPhase::Active)
                && status.observed_generation == Some(policy.generation())
        })
    }

    /// Link the policy to the Tool named after its type, in the same namespace.
    async fn link(&self, policy: &mut Policy) -> Result<()> {
        let kind = policy.spec.kind()?;
        let namespace = policy.namespace().unwrap_or_default();
        let tool = self
            .ctx
            .cluster
            .tools
            .get(&namespace, kind.as_str())
            .await?
            .ok_or_else(|| Error::not_found("Tool", format!("{namespace}/{kind}")))?;
        let owner = tool
            .owner_ref(&())
            .ok_or_else(|| Error::not_ready(format!("tool {kind} has no uid yet")))?;
        policy.owner_references_mut().push(owner);
        Ok(())
    }

    async fn cleanup(&self, policy: &Policy) -> Result<()> {
        match self.engine(policy) {
            Ok(engine) => engine.cleanup(policy).await,
            // Nothing was ever rendered for an unknown type.
            Err(e) if e.is_terminal() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn disable(&self, policy: &Policy) -> Result<()> {
        self.cleanup(policy).await?;

        let mut status = policy.status.clone().unwrap_or_default();
        status.phase = Some(PolicyPhase::Disabled);
        set_condition(
            &mut status.conditions,
            READY,
            false,
            "Disabled",
            "policy is disabled",
            Some(policy.generation()),
        );
        self.publish(policy, status).await?;
        info!(policy = %policy.name_any(), "policy disabled");
        Ok(())
    }

    async fn sync(&self, policy: &Policy) -> Result<Option<Duration>> {
        let engine = match self
            .engine(policy)
            .and_then(|engine| engine.validate(policy).map(|()| engine))
        {
            Ok(engine) => engine,
            Err(e) => {
                self.record_failure(policy, Some(PolicyPhase::Invalid), "ValidationFailed", &e)
                    .await;
                return Err(e);
            }
        };

        if let Err(e) = engine.reconcile(policy).await {
            self.record_failure(policy, None, "ReconcileFailed", &e).await;
            return Err(e);
        }

        let report = match engine.generate_report(policy).await {
            Ok(report) => self.ensure_report(report).await,
            Err(e) => Err(e),
        };

        let mut status = policy.status.clone().unwrap_or_default();
        status.phase = Some(PolicyPhase::Active);
        if let Some(report) = report.into_option_logged("report generation failed") {
            status.last_report = Some(report);
            status.observed_generation = Some(policy.generation());
        }
        set_condition(
            &mut status.conditions,
            READY,
            true,
            "Synced",
            "artifacts are in sync",
            Some(policy.generation()),
        );
        self.publish(policy, status).await?;
        Ok(None)
    }
}

/// Reconcile one Policy.
///
/// # Errors
///
/// Any lifecycle failure; the error policy decides on the retry.
#[instrument(skip(policy, ctx), fields(policy = %policy.name_any(), namespace = ?policy.namespace()))]
pub async fn reconcile_policy(policy: Arc<Policy>, ctx: Arc<Context>) -> Result<Action> {
    let transition = drive(&PolicyLifecycle::new(&ctx), &policy)
        .await
        .inspect_error(|e| warn!(error = %e, "policy reconcile failed"))?;
    debug!(?transition, "policy reconciled");

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
    use serde_json::json;

    use eirenyx_api::ReportPhase;
    use eirenyx_cluster::MemoryCluster;

    use super::*;
    use crate::tests::{context, policy, tool};

    async fn step(ctx: &Context, cluster: &MemoryCluster, name: &str) -> Result<Transition> {
        let policy = cluster.policies.get("shop", name).await?.unwrap();
        drive(&PolicyLifecycle::new(ctx), &policy).await
    }

    fn falco_policy() -> Policy {
        policy(
            "detect-shell",
            "falco",
            json!({"rules": [{"name": "shell", "condition": "spawned_process", "output": "o", "priority": "WARNING"}]}),
        )
    }

    async fn activated(ctx: &Context, cluster: &MemoryCluster, policy: &Policy) {
        cluster.tools.create(&tool("falco")).await.unwrap();
        cluster.policies.create(policy).await.unwrap();
        let name = policy.name_any();
        assert_eq!(step(ctx, cluster, &name).await.unwrap(), Transition::FinalizerAdded);
        assert_eq!(step(ctx, cluster, &name).await.unwrap(), Transition::OwnerLinked);
        assert_eq!(
            step(ctx, cluster, &name).await.unwrap(),
            Transition::Synced { requeue_after: None }
        );
    }

    #[tokio::test]
    async fn test_finalizer_is_added_before_any_work() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        cluster.tools.create(&tool("falco")).await.unwrap();
        cluster.policies.create(&falco_policy()).await.unwrap();

        let transition = step(&ctx, &cluster, "detect-shell").await.unwrap();

        assert_eq!(transition, Transition::FinalizerAdded);
        assert_eq!(cluster.artifact_writes(), 0);
        let stored = cluster.policies.get("shop", "detect-shell").await.unwrap().unwrap();
        assert_eq!(stored.finalizers(), [POLICY_FINALIZER.to_string()]);
    }

    #[tokio::test]
    async fn test_owner_link_to_tool() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let tool = cluster.tools.create(&tool("falco")).await.unwrap();
        cluster.policies.create(&falco_policy()).await.unwrap();

        step(&ctx, &cluster, "detect-shell").await.unwrap();
        step(&ctx, &cluster, "detect-shell").await.unwrap();

        let stored = cluster.policies.get("shop", "detect-shell").await.unwrap().unwrap();
        let owners = stored.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Tool");
        assert_eq!(Some(&owners[0].uid), tool.metadata.uid.as_ref());
        assert_eq!(cluster.artifact_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_retries() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        cluster.policies.create(&falco_policy()).await.unwrap();

        step(&ctx, &cluster, "detect-shell").await.unwrap();
        let err = step(&ctx, &cluster, "detect-shell").await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.requeue_after().is_some());
    }

    #[tokio::test]
    async fn test_active_sync_writes_artifacts_and_status() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        activated(&ctx, &cluster, &falco_policy()).await;

        assert_eq!(cluster.config_maps.snapshot().await.len(), 1);
        let report = cluster
            .reports
            .get("shop", "falco-report-detect-shell")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.spec.policy_ref.generation, 1);
        assert!(report.status.is_none_or(|s| s.phase == ReportPhase::Pending));

        let status = cluster
            .policies
            .get("shop", "detect-shell")
            .await
            .unwrap()
            .unwrap()
            .status
            .unwrap();
        assert_eq!(status.phase, Some(PolicyPhase::Active));
        assert_eq!(status.last_report.as_deref(), Some("falco-report-detect-shell"));
        assert_eq!(status.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        activated(&ctx, &cluster, &falco_policy()).await;
        let artifacts = cluster.artifact_writes();
        let policy_writes = cluster.policies.writes();
        let report_writes = cluster.reports.writes();

        step(&ctx, &cluster, "detect-shell").await.unwrap();

        assert_eq!(cluster.artifact_writes(), artifacts);
        assert_eq!(cluster.policies.writes(), policy_writes);
        assert_eq!(cluster.reports.writes(), report_writes);
    }

    #[tokio::test]
    async fn test_delete_runs_cleanup_before_object_vanishes() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        activated(&ctx, &cluster, &falco_policy()).await;

        cluster.policies.delete("shop", "detect-shell").await.unwrap();
        assert!(cluster.policies.get("shop", "detect-shell").await.unwrap().is_some());

        assert_eq!(step(&ctx, &cluster, "detect-shell").await.unwrap(), Transition::Finalized);

        assert!(cluster.policies.get("shop", "detect-shell").await.unwrap().is_none());
        assert!(cluster.config_maps.snapshot().await.is_empty());
        assert!(cluster.reports.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_finalizer() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        activated(&ctx, &cluster, &falco_policy()).await;
        cluster.policies.delete("shop", "detect-shell").await.unwrap();

        cluster.config_maps.fail_writes(true);
        let err = step(&ctx, &cluster, "detect-shell").await.unwrap_err();

        assert_eq!(err.requeue_after(), Some(eirenyx_core::RETRY_DELAY));
        let stored = cluster.policies.get("shop", "detect-shell").await.unwrap().unwrap();
        assert!(stored.metadata.deletion_timestamp.is_some());
        assert_eq!(stored.finalizers(), [POLICY_FINALIZER.to_string()]);

        cluster.config_maps.fail_writes(false);
        assert_eq!(step(&ctx, &cluster, "detect-shell").await.unwrap(), Transition::Finalized);
    }

    #[tokio::test]
    async fn test_disabled_policy_is_cleaned_up() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        activated(&ctx, &cluster, &falco_policy()).await;

        let mut stored = cluster.policies.get("shop", "detect-shell").await.unwrap().unwrap();
        stored.spec.enabled = false;
        cluster.policies.replace(&stored).await.unwrap();

        assert_eq!(step(&ctx, &cluster, "detect-shell").await.unwrap(), Transition::Disabled);

        let stored = cluster.policies.get("shop", "detect-shell").await.unwrap().unwrap();
        assert_eq!(stored.finalizers(), [POLICY_FINALIZER.to_string()]);
        assert_eq!(stored.status.unwrap().phase, Some(PolicyPhase::Disabled));
        assert!(cluster.config_maps.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_touches_no_artifacts() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let invalid = policy("detect-shell", "falco", json!({"rules": []}));
        cluster.tools.create(&tool("falco")).await.unwrap();
        cluster.policies.create(&invalid).await.unwrap();
        step(&ctx, &cluster, "detect-shell").await.unwrap();
        step(&ctx, &cluster, "detect-shell").await.unwrap();

        let err = step(&ctx, &cluster, "detect-shell").await.unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.requeue_after(), None);
        assert_eq!(cluster.artifact_writes(), 0);
        assert!(cluster.reports.snapshot().await.is_empty());
        let status = cluster
            .policies
            .get("shop", "detect-shell")
            .await
            .unwrap()
            .unwrap()
            .status
            .unwrap();
        assert_eq!(status.phase, Some(PolicyPhase::Invalid));
    }

    #[tokio::test]
    async fn test_mismatched_sub_spec_fails_validation() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let mismatched = policy("scan-images", "falco", json!(null));
        let mut mismatched = mismatched;
        mismatched.spec.trivy = Some(eirenyx_api::policy::TrivyPolicySpec::default());
        cluster.tools.create(&tool("falco")).await.unwrap();
        cluster.policies.create(&mismatched).await.unwrap();
        step(&ctx, &cluster, "scan-images").await.unwrap();
        step(&ctx, &cluster, "scan-images").await.unwrap();

        let err = step(&ctx, &cluster, "scan-images").await.unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(cluster.artifact_writes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_is_terminal() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        cluster
            .policies
            .create(&policy("audit", "kyverno", json!(null)))
            .await
            .unwrap();
        step(&ctx, &cluster, "audit").await.unwrap();

        let err = step(&ctx, &cluster, "audit").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
        assert_eq!(err.requeue_after(), None);
    }

    #[tokio::test]
    async fn test_spec_edit_moves_report_generation() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        activated(&ctx, &cluster, &falco_policy()).await;

        let mut stored = cluster.policies.get("shop", "detect-shell").await.unwrap().unwrap();
        stored.spec.falco.as_mut().unwrap().rules[0].priority = "ERROR".to_string();
        cluster.policies.replace(&stored).await.unwrap();
        step(&ctx, &cluster, "detect-shell").await.unwrap();

        let report = cluster
            .reports
            .get("shop", "falco-report-detect-shell")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.spec.policy_ref.generation, 2);
    }

    #[tokio::test]
    async fn test_reconcile_policy_awaits_change() {
        let cluster = MemoryCluster::new();
        let ctx = Arc::new(context(&cluster));
        cluster.tools.create(&tool("falco")).await.unwrap();
        let created = cluster.policies.create(&falco_policy()).await.unwrap();

        let action = reconcile_policy(Arc::new(created), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}
