//! Trivy reports: aggregate the vulnerability results of the policy's scan Jobs.

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

use eirenyx_api::labels::Selector;
use eirenyx_api::trivy::SeveritySummary;
use eirenyx_api::{Policy, PolicyReport, PolicyReportStatus, ReportPhase, ReportSummary, TypedPolicy, VulnerabilityReport};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};
use eirenyx_policy::trivy::expected_jobs;

use crate::{ReportHandler, count, publish};

pub struct TrivyHandler {
    cluster: Cluster,
}

impl TrivyHandler {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }

    /// Scan results produced for the policy's current Jobs.
    async fn matching_results(&self, report: &PolicyReport, jobs: &[String]) -> Result<Vec<VulnerabilityReport>> {
        let namespace = report.namespace().unwrap_or_default();
        Ok(self
            .cluster
            .vulnerability_reports
            .list(Some(&namespace), &Selector::new())
            .await?
            .into_iter()
            .filter(|result| jobs.iter().any(|job| result.is_for_job(job)))
            .collect())
    }
}

#[async_trait]
impl ReportHandler for TrivyHandler {
    async fn handle(&self, report: &PolicyReport, policy: &Policy) -> Result<()> {
        let TypedPolicy::Trivy(spec) = policy.spec.typed()? else {
            return Err(Error::validation("trivy report requires a trivy policy"));
        };

        let jobs = expected_jobs(policy, spec);
        let results = self.matching_results(report, &jobs).await?;

        if results.is_empty() {
            let status = PolicyReportStatus {
                phase: ReportPhase::Running,
                ..report.status.clone().unwrap_or_default()
            };
            publish(&self.cluster, report, status).await?;
            debug!(report = %report.name_any(), "no scan results yet");
            return Err(Error::not_ready(format!(
                "no scan results for policy {} yet",
                policy.name_any()
            )));
        }

        let failed = results
            .iter()
            .filter(|result| result.report.summary.is_failing())
            .count();
        let totals = results
            .iter()
            .fold(SeveritySummary::default(), |acc, result| acc.add(result.report.summary));
        let vulnerabilities: Vec<_> = results
            .iter()
            .flat_map(|result| result.report.vulnerabilities.iter().cloned())
            .collect();

        let status = PolicyReportStatus {
            phase: ReportPhase::Completed,
            summary: ReportSummary::from_counts(totals.total(), count(failed)),
            details: Some(json!({
                "reportCount": results.len(),
                "severityTotals": totals,
                "vulnerabilities": vulnerabilities,
            })),
            ..PolicyReportStatus::default()
        };
        publish(&self.cluster, report, status).await?;

        info!(
            report = %report.name_any(),
            scans = results.len(),
            failed,
            findings = totals.total(),
            "trivy report updated"
        );
        Ok(())
    }
}
