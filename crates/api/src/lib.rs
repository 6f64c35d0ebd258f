#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Eirenyx API - declarative object types
//!
//! - `Tool`: an installable security or chaos-testing capability
//! - `Policy`: one tool's behavior against a target selector
//! - `PolicyReport`: the computed verdict for one Policy
//!
//! Also home to the external objects Eirenyx renders or reads
//! (`ChaosEngine`, `VulnerabilityReport`) and the labeling and naming
//! conventions every managed artifact follows.

pub mod condition;
pub mod kind;
pub mod labels;
pub mod litmus;
pub mod naming;
pub mod policy;
pub mod report;
pub mod schema;
pub mod tool;
pub mod trivy;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub use kind::Kind;
pub use litmus::ChaosEngine;
pub use policy::{POLICY_FINALIZER, Policy, PolicyPhase, PolicySpec, PolicyStatus, TypedPolicy};
pub use report::{
    PolicyRef, PolicyReport, PolicyReportSpec, PolicyReportStatus, ReportPhase, ReportSummary,
    Verdict,
};
pub use tool::{TOOL_FINALIZER, Tool, ToolSpec, ToolStatus};
pub use trivy::VulnerabilityReport;

/// Definitions of the objects Eirenyx owns.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![Tool::crd(), Policy::crd(), PolicyReport::crd()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crds_share_group() {
        let crds = crds();
        assert_eq!(crds.len(), 3);
        assert!(crds.iter().all(|crd| crd.spec.group == "eirenyx.eirenyx"));
    }

    #[test]
    fn test_policy_plural() {
        assert_eq!(Policy::crd().spec.names.plural, "policies");
    }
}
