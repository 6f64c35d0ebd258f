//! Install profiles for each tool kind.

use std::time::Duration;

use serde_json::{Value, json};

use eirenyx_api::Kind;

/// A chart repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: &'static str,
    pub url: &'static str,
}

/// The workload whose readiness stands for the tool's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Healthy when every scheduled pod is ready.
    DaemonSet(&'static str),
    /// Healthy when the rollout is observed and available.
    Deployment(&'static str),
}

/// Everything needed to install one tool kind.
#[derive(Debug, Clone)]
pub struct ToolProfile {
    pub kind: Kind,
    pub namespace: &'static str,
    pub release: &'static str,
    pub repository: Repository,
    pub chart: &'static str,
    pub workload: Workload,
    /// Overrides the configured install wait for slow charts.
    pub install_timeout: Option<Duration>,
    baseline: fn() -> Value,
}

impl ToolProfile {
    pub fn for_kind(kind: Kind) -> Self {
        match kind {
            Kind::Falco => Self {
                kind,
                namespace: "falco",
                release: "falco",
                repository: Repository {
                    name: "falcosecurity",
                    url: "https://falcosecurity.github.io/charts",
                },
                chart: "falcosecurity/falco",
                workload: Workload::DaemonSet("falco"),
                install_timeout: None,
                baseline: || json!({ "tty": true, "driver": { "kind": "modern_ebpf" } }),
            },
            Kind::Trivy => Self {
                kind,
                namespace: "trivy-system",
                release: "trivy-operator",
                repository: Repository {
                    name: "aqua",
                    url: "https://aquasecurity.github.io/helm-charts/",
                },
                chart: "aqua/trivy-operator",
                workload: Workload::Deployment("trivy-operator"),
                install_timeout: None,
                baseline: || json!({ "operator": { "vulnerabilityScannerEnabled": true } }),
            },
            Kind::Litmus => Self {
                kind,
                namespace: "litmus",
                release: "litmus",
                repository: Repository {
                    name: "litmuschaos",
                    url: "https://litmuschaos.github.io/litmus-helm/",
                },
                chart: "litmuschaos/litmus",
                workload: Workload::Deployment("litmus-server"),
                install_timeout: Some(Duration::from_secs(10 * 60)),
                baseline: || json!({}),
            },
        }
    }

    /// Default chart values before the tool's declared values are merged in.
    pub fn baseline_values(&self) -> Value {
        (self.baseline)()
    }

    /// Install namespace: the declared one, else the tool's conventional namespace.
    pub fn namespace_or<'a>(&'a self, declared: Option<&'a str>) -> &'a str {
        declared.filter(|ns| !ns.is_empty()).unwrap_or(self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_profile() {
        for kind in Kind::ALL {
            let profile = ToolProfile::for_kind(kind);
            assert_eq!(profile.kind, kind);
            assert!(profile.chart.starts_with(profile.repository.name));
            assert!(profile.baseline_values().is_object());
        }
    }

    #[test]
    fn test_falco_is_daemon_style() {
        let profile = ToolProfile::for_kind(Kind::Falco);
        assert_eq!(profile.workload, Workload::DaemonSet("falco"));
    }

    #[test]
    fn test_declared_namespace_wins() {
        let profile = ToolProfile::for_kind(Kind::Trivy);
        assert_eq!(profile.namespace_or(Some("scanners")), "scanners");
        assert_eq!(profile.namespace_or(Some("")), "trivy-system");
        assert_eq!(profile.namespace_or(None), "trivy-system");
    }

    #[test]
    fn test_litmus_waits_longer() {
        let profile = ToolProfile::for_kind(Kind::Litmus);
        assert_eq!(profile.install_timeout, Some(Duration::from_secs(600)));
    }
}
