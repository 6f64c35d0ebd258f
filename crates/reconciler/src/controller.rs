//! Controller wiring: one watch loop per owned kind, sharing one [`Context`].

use std::sync::Arc;

use futures::{StreamExt, future};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use eirenyx_api::labels::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, POLICY_NAME_LABEL, POLICY_NAMESPACE_LABEL};
use eirenyx_api::{ChaosEngine, Policy, PolicyReport, Tool};
use eirenyx_core::Error;

use crate::context::Context;
use crate::policy::reconcile_policy;
use crate::report::reconcile_report;
use crate::tool::reconcile_tool;

/// Retry decision for a failed reconcile.
///
/// Terminal errors wait for the object to change; everything else retries
/// after a short delay.
pub fn error_policy<K>(obj: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let name = obj.name_any();
    match error.requeue_after() {
        Some(delay) => {
            warn!(%kind, %name, error = %error, retry_in = ?delay, "reconcile failed, retrying");
            Action::requeue(delay)
        }
        None => {
            error!(%kind, %name, error = %error, "reconcile failed, waiting for a spec change");
            Action::await_change()
        }
    }
}

/// The Policy owning an artifact that cannot carry an owner reference.
fn labeled_policy(engine: ChaosEngine) -> Option<ObjectRef<Policy>> {
    let labels = engine.labels();
    let name = labels.get(POLICY_NAME_LABEL)?;
    let namespace = labels.get(POLICY_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(name).within(namespace))
}

fn managed() -> watcher::Config {
    watcher::Config::default().labels(&format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}"))
}

/// Run the Tool, Policy and PolicyReport controllers until `ctx.cancel` fires.
pub async fn run(client: Client, ctx: Arc<Context>) {
    let shutdown = || ctx.cancel.clone().cancelled_owned();

    let tools = Controller::new(Api::<Tool>::all(client.clone()), watcher::Config::default())
        .graceful_shutdown_on(shutdown())
        .run(reconcile_tool, error_policy, ctx.clone())
        .for_each(|result| {
            log_result("Tool", result.map(|(obj, _)| obj).map_err(|e| e.to_string()));
            future::ready(())
        });

    let policies = Controller::new(Api::<Policy>::all(client.clone()), watcher::Config::default())
        .owns(Api::<ConfigMap>::all(client.clone()), managed())
        .owns(Api::<Job>::all(client.clone()), managed())
        .watches(Api::<ChaosEngine>::all(client.clone()), managed(), labeled_policy)
        .graceful_shutdown_on(shutdown())
        .run(reconcile_policy, error_policy, ctx.clone())
        .for_each(|result| {
            log_result("Policy", result.map(|(obj, _)| obj).map_err(|e| e.to_string()));
            future::ready(())
        });

    let reports = Controller::new(Api::<PolicyReport>::all(client), watcher::Config::default())
        .graceful_shutdown_on(shutdown())
        .run(reconcile_report, error_policy, ctx.clone())
        .for_each(|result| {
            log_result("PolicyReport", result.map(|(obj, _)| obj).map_err(|e| e.to_string()));
            future::ready(())
        });

    info!("controllers started");
    tokio::join!(tools, policies, reports);
    info!("controllers stopped");
}

fn log_result<K>(kind: &str, result: Result<ObjectRef<K>, String>)
where
    K: Resource<DynamicType = ()>,
{
    match result {
        Ok(obj) => debug!(%kind, object = %obj, "reconciled"),
        Err(e) => debug!(%kind, error = %e, "reconcile did not complete"),
    }
}
