#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Eirenyx Report - per-type verdict computation
//!
//! A handler reads live state for one PolicyReport and writes its status:
//!
//! - Falco: sampled pod evidence and a synthetic finding count
//! - Trivy: aggregated vulnerability results of the policy's scan Jobs
//! - Litmus: one passed check per declared experiment
//!
//! Handlers return `NotReady` when the underlying results do not exist yet,
//! so the caller can retry instead of completing early.

pub mod falco;
pub mod litmus;
pub mod sampler;
pub mod trivy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

use eirenyx_api::{Kind, Policy, PolicyReport, PolicyReportStatus};
use eirenyx_cluster::Cluster;
use eirenyx_core::Result;

pub use falco::FalcoHandler;
pub use litmus::LitmusHandler;
pub use sampler::{PodDetail, PodSampler};
pub use trivy::TrivyHandler;

/// Computes and persists the status of one report.
#[async_trait]
pub trait ReportHandler: Send + Sync {
    /// Refresh `report` from live state for `policy`.
    ///
    /// # Errors
    ///
    /// `NotReady` when results are not produced yet, `Validation` when the
    /// policy does not carry the matching sub-spec, API errors otherwise.
    async fn handle(&self, report: &PolicyReport, policy: &Policy) -> Result<()>;
}

/// One handler per report type.
pub struct ReportHandlers {
    falco: FalcoHandler,
    trivy: TrivyHandler,
    litmus: LitmusHandler,
}

impl ReportHandlers {
    /// Handlers over `cluster`.
    ///
    /// `seed` pins the Falco evidence sampling and `refresh` is how long drawn
    /// evidence stays current.
    pub fn new(cluster: Cluster, seed: Option<u64>, refresh: Duration) -> Self {
        let sampler = Arc::new(PodSampler::new(cluster.clone(), seed));
        Self {
            falco: FalcoHandler::new(cluster.clone(), sampler, refresh),
            trivy: TrivyHandler::new(cluster.clone()),
            litmus: LitmusHandler::new(cluster),
        }
    }

    /// The handler for the report's declared type.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for an unknown type.
    pub fn for_report(&self, report: &PolicyReport) -> Result<&dyn ReportHandler> {
        let kind: Kind = report.spec.report_type.parse()?;
        Ok(match kind {
            Kind::Falco => &self.falco,
            Kind::Trivy => &self.trivy,
            Kind::Litmus => &self.litmus,
        })
    }
}

/// Write `status` to `report` unless it already holds exactly that. Returns whether a write happened.
pub async fn publish(cluster: &Cluster, report: &PolicyReport, status: PolicyReportStatus) -> Result<bool> {
    if report.status.as_ref() == Some(&status) {
        debug!(report = %report.name_any(), "report status unchanged");
        return Ok(false);
    }
    let mut updated = report.clone();
    updated.status = Some(status);
    cluster.reports.replace_status(&updated).await?;
    Ok(true)
}

/// Count as a summary field, saturating on overflow.
pub(crate) fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
