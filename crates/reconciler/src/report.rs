//! PolicyReport controller: refreshes verdicts and collects orphans.

use std::sync::Arc;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use eirenyx_api::PolicyReport;
use eirenyx_cluster::ObjectStore;
use eirenyx_core::{ORPHAN_RETRY_DELAY, Result, ResultExt};

use crate::context::Context;

/// Reconcile one PolicyReport.
///
/// A report whose Policy no longer exists is deleted. Otherwise the handler
/// for its type refreshes the status and the report is looked at again
/// after the refresh interval.
///
/// # Errors
///
/// `UnsupportedType` for an unknown report type, `NotReady` while results
/// are pending, API errors otherwise.
#[instrument(skip(report, ctx), fields(report = %report.name_any(), namespace = ?report.namespace()))]
pub async fn reconcile_report(report: Arc<PolicyReport>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = report.namespace().unwrap_or_default();
    let policy_name = &report.spec.policy_ref.name;

    let Some(policy) = ctx.cluster.policies.get(&namespace, policy_name).await? else {
        return Ok(collect_orphan(&ctx, &report, &namespace).await);
    };

    ctx.reports
        .for_report(&report)?
        .handle(&report, &policy)
        .await
        .inspect_error(|e| debug!(error = %e, "report not refreshed"))?;

    Ok(Action::requeue(ctx.config.report_refresh))
}

async fn collect_orphan(ctx: &Context, report: &PolicyReport, namespace: &str) -> Action {
    let name = report.name_any();
    match ctx.cluster.reports.delete(namespace, &name).await {
        Ok(_) => {
            info!(policy = %report.spec.policy_ref.name, "policy gone, report deleted");
            Action::await_change()
        }
        Err(e) => {
            warn!(error = %e, "failed to delete orphaned report");
            Action::requeue(ORPHAN_RETRY_DELAY)
        }
    }
}
