//! Litmus reports.
//!
//! Chaos results are not read yet: every declared experiment counts as one
//! passed check.

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

use eirenyx_api::{Policy, PolicyReport, PolicyReportStatus, ReportPhase, ReportSummary, TypedPolicy};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};

use crate::{ReportHandler, count, publish};

pub struct LitmusHandler {
    cluster: Cluster,
}

impl LitmusHandler {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl ReportHandler for LitmusHandler {
    async fn handle(&self, report: &PolicyReport, policy: &Policy) -> Result<()> {
        let TypedPolicy::Litmus(spec) = policy.spec.typed()? else {
            return Err(Error::validation("litmus report requires a litmus policy"));
        };

        let experiments: Vec<&str> = spec.experiments.iter().map(|e| e.name.as_str()).collect();
        let status = PolicyReportStatus {
            phase: ReportPhase::Completed,
            summary: ReportSummary::from_counts(count(experiments.len()), 0),
            details: Some(json!({ "experiments": experiments })),
            ..PolicyReportStatus::default()
        };

        if publish(&self.cluster, report, status).await? {
            info!(report = %report.name_any(), experiments = experiments.len(), "litmus report updated");
        }
        Ok(())
    }
}
