//! Workload readiness checks and bounded polling.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use eirenyx_core::{Error, Result};

/// Every scheduled pod is ready, and at least one is.
pub fn daemon_set_ready(daemon_set: &DaemonSet) -> bool {
    daemon_set.status.as_ref().is_some_and(|status| {
        status.number_ready > 0 && status.number_ready >= status.desired_number_scheduled
    })
}

/// The latest spec is observed and the `Available` condition is true.
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let generation = deployment.metadata.generation.unwrap_or(0);
    deployment.status.as_ref().is_some_and(|status| {
        status.observed_generation.unwrap_or(0) >= generation
            && status.conditions.as_ref().is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Available" && c.status == "True")
            })
    })
}

/// Probe every `interval` until it reports ready or `ceiling` elapses.
///
/// Returns `Ok(false)` on timeout. Probe errors end the poll.
pub async fn poll_until<F, Fut>(
    interval: Duration,
    ceiling: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<bool>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send,
{
    let deadline = Instant::now() + ceiling;
    loop {
        if probe().await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!(ceiling_secs = ceiling.as_secs(), "readiness poll timed out");
            return Ok(false);
        }
        let pause = interval.min(deadline - now);
        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            () = cancel.cancelled() => return Err(Error::cancelled("readiness poll")),
        }
    }
}
