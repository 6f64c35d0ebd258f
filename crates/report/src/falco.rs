//! Falco reports: sampled pod evidence with a synthetic finding count.
//!
//! Falco alerts are not consumed yet. The finding count is drawn from the
//! sampler's random source and the evidence is a sample of live pods.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

use eirenyx_api::{Policy, PolicyReport, PolicyReportStatus, ReportPhase, ReportSummary, TypedPolicy};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};

use crate::sampler::PodSampler;
use crate::{ReportHandler, publish};

const REPORT_MESSAGE: &str = "Obtained results for policy reconciliation.";

pub struct FalcoHandler {
    cluster: Cluster,
    sampler: Arc<PodSampler>,
    refresh: Duration,
}

impl FalcoHandler {
    pub fn new(cluster: Cluster, sampler: Arc<PodSampler>, refresh: Duration) -> Self {
        Self {
            cluster,
            sampler,
            refresh,
        }
    }

    /// Whether the stored evidence was drawn for this generation less than
    /// one refresh interval ago.
    fn is_fresh(&self, report: &PolicyReport) -> bool {
        let Some(status) = report.status.as_ref().filter(|_| report.is_completed()) else {
            return false;
        };
        status.observed_generation == report.metadata.generation
            && status.refreshed_at.as_ref().is_some_and(|at| {
                (Utc::now() - at.0)
                    .to_std()
                    .is_ok_and(|age| age < self.refresh)
            })
    }
}

#[async_trait]
impl ReportHandler for FalcoHandler {
    async fn handle(&self, report: &PolicyReport, policy: &Policy) -> Result<()> {
        let TypedPolicy::Falco(spec) = policy.spec.typed()? else {
            return Err(Error::validation("falco report requires a falco policy"));
        };

        // Every draw differs, so redrawing on each pass would write status forever.
        if self.is_fresh(report) {
            debug!(report = %report.name_any(), "falco evidence still current");
            return Ok(());
        }

        let findings = self.sampler.finding_count().await;
        let pods = self.sampler.sample(findings as usize).await?;

        let status = PolicyReportStatus {
            phase: ReportPhase::Completed,
            summary: ReportSummary::from_counts(1, u32::from(findings > 0)),
            details: Some(json!({
                "message": REPORT_MESSAGE,
                "rule": spec.observed_rule().unwrap_or_default(),
                "findings": findings,
                "podDetails": pods,
            })),
            observed_generation: report.metadata.generation,
            refreshed_at: Some(Time(Utc::now())),
        };
        publish(&self.cluster, report, status).await?;

        info!(report = %report.name_any(), findings, "falco report updated");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use eirenyx_api::{Kind, Verdict};
    use eirenyx_cluster::{MemoryCluster, ObjectStore};

    use super::*;
    use crate::sampler::tests::pod;
    use crate::tests::{policy, stored_report};

    fn falco_policy() -> Policy {
        policy(
            "falco",
            json!({
                "rules": [{"name": "shell", "condition": "spawned_process", "output": "o", "priority": "WARNING"}],
                "observe": {"ruleRef": {"name": "Terminal shell in container"}}
            }),
        )
    }

    fn handler(cluster: &MemoryCluster) -> FalcoHandler {
        FalcoHandler::new(
            cluster.handle(),
            Arc::new(PodSampler::new(cluster.handle(), Some(3))),
            Duration::from_secs(60),
        )
    }

    async fn fetch(cluster: &MemoryCluster, report: &PolicyReport) -> PolicyReport {
        cluster.reports.get("shop", &report.name_any()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_verdict_follows_finding_count() {
        let cluster = MemoryCluster::new();
        cluster.pods.create(&pod("shop", "cart-0")).await.unwrap();
        let policy = falco_policy();
        let report = stored_report(&cluster, &policy, Kind::Falco).await;
        let handler = handler(&cluster);

        handler.handle(&report, &policy).await.unwrap();

        let status = cluster
            .reports
            .get("shop", &report.name_any())
            .await
            .unwrap()
            .unwrap()
            .status
            .unwrap();
        let details = status.details.unwrap();
        let findings = details["findings"].as_u64().unwrap();

        assert_eq!(status.phase, ReportPhase::Completed);
        assert_eq!(status.summary.total_checks, 1);
        let expected = if findings == 0 { Verdict::Pass } else { Verdict::Fail };
        assert_eq!(status.summary.verdict, expected);
        assert_eq!(details["rule"], "Terminal shell in container");
        assert_eq!(details["message"], REPORT_MESSAGE);
        assert!(details["podDetails"].as_array().unwrap().len() <= 1);
    }

    #[tokio::test]
    async fn test_rejects_mismatched_policy() {
        let cluster = MemoryCluster::new();
        let trivy = policy("trivy", json!({"scans": []}));
        let report = stored_report(&cluster, &trivy, Kind::Falco).await;
        let handler = handler(&cluster);

        let result = handler.handle(&report, &trivy).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_unchanged_report_is_written_once_per_interval() {
        let cluster = MemoryCluster::new();
        cluster.pods.create(&pod("shop", "cart-0")).await.unwrap();
        let policy = falco_policy();
        let report = stored_report(&cluster, &policy, Kind::Falco).await;
        let handler = handler(&cluster);
        let before = cluster.reports.writes();

        for _ in 0..10 {
            let current = fetch(&cluster, &report).await;
            handler.handle(&current, &policy).await.unwrap();
        }

        assert_eq!(cluster.reports.writes(), before + 1);
        let status = fetch(&cluster, &report).await.status.unwrap();
        assert_eq!(status.observed_generation, Some(1));
        assert!(status.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_evidence_is_redrawn() {
        let cluster = MemoryCluster::new();
        let policy = falco_policy();
        let report = stored_report(&cluster, &policy, Kind::Falco).await;
        let handler = handler(&cluster);
        handler.handle(&report, &policy).await.unwrap();

        let mut stale = fetch(&cluster, &report).await;
        if let Some(status) = stale.status.as_mut() {
            status.refreshed_at = Some(Time(Utc::now() - chrono::Duration::minutes(5)));
        }
        let stale = cluster.reports.replace_status(&stale).await.unwrap();
        let before = cluster.reports.writes();

        handler.handle(&stale, &policy).await.unwrap();

        assert_eq!(cluster.reports.writes(), before + 1);
        let refreshed = fetch(&cluster, &report).await.status.unwrap();
        let previous = stale.status.and_then(|s| s.refreshed_at).map(|t| t.0);
        assert!(refreshed.refreshed_at.map(|t| t.0) > previous);
    }
}
