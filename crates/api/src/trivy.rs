//! Vulnerability reports produced by the Trivy operator.
//!
//! The object carries its payload under `report` rather than `spec`, so the
//! `kube::Resource` binding is written by hand.

use std::borrow::Cow;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Label naming the kind of workload a report was produced for.
pub const RESOURCE_KIND_LABEL: &str = "trivy-operator.resource.kind";

/// Label naming the workload a report was produced for.
pub const RESOURCE_NAME_LABEL: &str = "trivy-operator.resource.name";

/// `aquasecurity.github.io/v1alpha1` VulnerabilityReport.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct VulnerabilityReport {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub report: VulnerabilityReportData,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct VulnerabilityReportData {
    #[serde(default)]
    pub summary: SeveritySummary,

    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

/// Finding counts per severity.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeveritySummary {
    #[serde(default)]
    pub critical_count: u32,
    #[serde(default)]
    pub high_count: u32,
    #[serde(default)]
    pub medium_count: u32,
    #[serde(default)]
    pub low_count: u32,
    #[serde(default)]
    pub unknown_count: u32,
}

impl SeveritySummary {
    /// Whether any finding is severe enough to fail the scan.
    pub const fn is_failing(&self) -> bool {
        self.critical_count > 0 || self.high_count > 0
    }

    pub const fn total(&self) -> u32 {
        self.critical_count + self.high_count + self.medium_count + self.low_count
    }

    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self {
            critical_count: self.critical_count + other.critical_count,
            high_count: self.high_count + other.high_count,
            medium_count: self.medium_count + other.medium_count,
            low_count: self.low_count + other.low_count,
            unknown_count: self.unknown_count + other.unknown_count,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(rename = "vulnerabilityID", default)]
    pub vulnerability_id: String,

    #[serde(default)]
    pub severity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl kube::Resource for VulnerabilityReport {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind((): &()) -> Cow<'_, str> {
        Cow::Borrowed("VulnerabilityReport")
    }

    fn group((): &()) -> Cow<'_, str> {
        Cow::Borrowed("aquasecurity.github.io")
    }

    fn version((): &()) -> Cow<'_, str> {
        Cow::Borrowed("v1alpha1")
    }

    fn plural((): &()) -> Cow<'_, str> {
        Cow::Borrowed("vulnerabilityreports")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl VulnerabilityReport {
    /// Whether the report was produced for the Job named `job`.
    pub fn is_for_job(&self, job: &str) -> bool {
        self.metadata.labels.as_ref().is_some_and(|labels| {
            labels.get(RESOURCE_KIND_LABEL).map(String::as_str) == Some("Job")
                && labels.get(RESOURCE_NAME_LABEL).map(String::as_str) == Some(job)
        })
    }
}
