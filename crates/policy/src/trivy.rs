//! Trivy engine: one scan Job per declared scan.
//!
//! Job names carry the policy generation, so a spec edit starts a fresh scan
//! while an unchanged spec never restarts an in-flight or finished one.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use eirenyx_api::labels::{self, TRIVY_SCAN_LABEL};
use eirenyx_api::policy::{TrivyPolicySpec, TrivyScan};
use eirenyx_api::{Kind, Policy, PolicyReport, TypedPolicy, naming};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};

use crate::Engine;
use crate::artifact;

pub const SCANNER_IMAGE: &str = "aquasec/trivy:latest";
const SCAN_TTL_SECONDS: i32 = 300;

pub struct TrivyEngine {
    cluster: Cluster,
}

impl TrivyEngine {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }
}

fn trivy_spec(policy: &Policy) -> Result<&TrivyPolicySpec> {
    match policy.spec.typed()? {
        TypedPolicy::Trivy(spec) => Ok(spec),
        _ => Err(Error::validation("trivy engine received a non-trivy policy")),
    }
}

/// Names of the scan Jobs the current generation of `policy` expects.
pub fn expected_jobs(policy: &Policy, spec: &TrivyPolicySpec) -> Vec<String> {
    let policy_name = policy.name_any();
    spec.scans
        .iter()
        .map(|scan| naming::trivy_job(&policy_name, &scan.name, policy.generation()))
        .collect()
}

/// Scanner command line for one scan.
pub fn scan_command(scan: &TrivyScan) -> Vec<String> {
    let mut command = vec!["trivy".to_string(), "image".to_string()];
    if let Some(severity) = scan.severity.as_deref().filter(|s| !s.is_empty()) {
        command.extend(["--severity".to_string(), severity.to_string()]);
    }
    if scan.ignore_unfixed {
        command.push("--ignore-unfixed".to_string());
    }
    if !scan.vulnerability_types.is_empty() {
        command.extend([
            "--vuln-type".to_string(),
            scan.vulnerability_types.join(","),
        ]);
    }
    if let Some(code) = scan.exit_code {
        command.extend(["--exit-code".to_string(), code.to_string()]);
    }
    command.push(scan.image.clone());
    command
}

fn scan_job(policy: &Policy, scan: &TrivyScan, name: String) -> Job {
    Job {
        metadata: artifact::owned_meta(policy, name, &[(TRIVY_SCAN_LABEL, &scan.name)]),
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(SCAN_TTL_SECONDS),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some([(TRIVY_SCAN_LABEL.to_string(), scan.name.clone())].into()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "trivy".to_string(),
                        image: Some(SCANNER_IMAGE.to_string()),
                        command: Some(scan_command(scan)),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..JobSpec::default()
        }),
        ..Job::default()
    }
}

#[async_trait]
impl Engine for TrivyEngine {
    fn validate(&self, policy: &Policy) -> Result<()> {
        let spec = trivy_spec(policy)?;
        if spec.scans.is_empty() {
            return Err(Error::validation(
                "spec.trivy.scans must contain at least one scan",
            ));
        }
        for (i, scan) in spec.scans.iter().enumerate() {
            if scan.name.is_empty() {
                return Err(Error::validation(format!("trivy.scans[{i}].name is required")));
            }
            if scan.image.is_empty() {
                return Err(Error::validation(format!("trivy.scans[{i}].image is required")));
            }
        }
        Ok(())
    }

    async fn reconcile(&self, policy: &Policy) -> Result<()> {
        let spec = trivy_spec(policy)?;
        let policy_name = policy.name_any();
        let namespace = policy.namespace().unwrap_or_default();
        let expected = expected_jobs(policy, spec);

        for (scan, name) in spec.scans.iter().zip(&expected) {
            if self.cluster.jobs.get(&namespace, name).await?.is_some() {
                debug!(policy = %policy_name, job = %name, "scan job exists, leaving untouched");
                continue;
            }
            self.cluster
                .jobs
                .create(&scan_job(policy, scan, name.clone()))
                .await?;
            info!(policy = %policy_name, job = %name, image = %scan.image, "scan job created");
        }

        // Jobs of older generations or removed scans.
        let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
        let managed = self
            .cluster
            .jobs
            .list(Some(&namespace), &labels::policy_selector(&policy_name))
            .await?;
        for job in managed.iter().filter(|job| !expected.contains(job.name_any().as_str())) {
            self.cluster.jobs.delete(&namespace, &job.name_any()).await?;
            info!(policy = %policy_name, job = %job.name_any(), "stale scan job deleted");
        }
        Ok(())
    }

    async fn cleanup(&self, policy: &Policy) -> Result<()> {
        let policy_name = policy.name_any();
        let namespace = policy.namespace().unwrap_or_default();
        let jobs = self
            .cluster
            .jobs
            .list(Some(&namespace), &labels::policy_selector(&policy_name))
            .await?;
        for job in &jobs {
            self.cluster.jobs.delete(&namespace, &job.name_any()).await?;
        }
        info!(policy = %policy_name, removed = jobs.len(), "trivy scan jobs cleaned up");
        Ok(())
    }

    async fn generate_report(&self, policy: &Policy) -> Result<PolicyReport> {
        Ok(artifact::report_for(policy, Kind::Trivy))
    }
}
