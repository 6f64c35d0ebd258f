//! The `PolicyReport` object: the latest observed outcome of one Policy.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a report: which policy generation it describes.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(
    group = "eirenyx.eirenyx",
    version = "v1alpha1",
    kind = "PolicyReport",
    namespaced,
    status = "PolicyReportStatus",
    shortname = "polr",
    printcolumn = r#"{"name":"Policy", "type":"string", "jsonPath":".spec.policyRef.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Verdict", "type":"string", "jsonPath":".status.summary.verdict"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReportSpec {
    pub policy_ref: PolicyRef,

    #[serde(rename = "type")]
    pub report_type: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct PolicyRef {
    pub name: String,

    #[serde(default)]
    pub generation: i64,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ReportPhase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum Verdict {
    Pass,
    Fail,
    #[default]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub total_checks: u32,
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
}

impl ReportSummary {
    /// Summary for `total` checks of which `failed` did not pass.
    ///
    /// The verdict is `Fail` as soon as one check failed.
    pub fn from_counts(total: u32, failed: u32) -> Self {
        let failed = failed.min(total);
        Self {
            verdict: if failed > 0 { Verdict::Fail } else { Verdict::Pass },
            total_checks: total,
            passed: total - failed,
            failed,
        }
    }
}

/// Observed outcome of a policy run.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReportStatus {
    #[serde(default)]
    pub phase: ReportPhase,

    #[serde(default)]
    pub summary: ReportSummary,

    /// Tool-specific findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::schema::preserve_unknown_fields")]
    pub details: Option<serde_json::Value>,

    /// Report generation the status was computed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// When sampled evidence was last drawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<Time>,
}

impl PolicyReport {
    /// Whether the stored status reflects a finished run.
    pub fn is_completed(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.phase == ReportPhase::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_fails_on_any_failure() {
        let summary = ReportSummary::from_counts(3, 1);
        assert_eq!(summary.verdict, Verdict::Fail);
        assert_eq!(summary.passed, 2);
    }

    #[test]
    fn test_summary_passes_when_clean() {
        let summary = ReportSummary::from_counts(2, 0);
        assert_eq!(summary.verdict, Verdict::Pass);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_summary_clamps_failed_to_total() {
        let summary = ReportSummary::from_counts(1, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed, 0);
    }

    #[test]
    fn test_completed_only_with_completed_status() {
        let mut report = PolicyReport::new(
            "falco-report-baseline",
            PolicyReportSpec {
                policy_ref: PolicyRef {
                    name: "baseline".to_string(),
                    generation: 1,
                },
                report_type: "falco".to_string(),
            },
        );
        assert!(!report.is_completed());

        report.status = Some(PolicyReportStatus {
            phase: ReportPhase::Running,
            ..PolicyReportStatus::default()
        });
        assert!(!report.is_completed());

        report.status = Some(PolicyReportStatus {
            phase: ReportPhase::Completed,
            ..PolicyReportStatus::default()
        });
        assert!(report.is_completed());
    }

    #[test]
    fn test_default_status_is_pending_unknown() {
        let status = PolicyReportStatus::default();
        assert_eq!(status.phase, ReportPhase::Pending);
        assert_eq!(status.summary.verdict, Verdict::Unknown);
    }
}
