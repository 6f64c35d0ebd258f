//! Deterministic artifact names. Every name is a pure function of policy identity.

use crate::kind::Kind;

/// Key of the rule document inside the Falco ConfigMap.
pub const FALCO_RULES_KEY: &str = "eirenyx_rules.yaml";

pub fn falco_config_map(policy: &str) -> String {
    format!("eirenyx-falco-policy-{policy}")
}

/// Scan Job name. The generation suffix forces a fresh scan after a spec edit.
pub fn trivy_job(policy: &str, scan: &str, generation: i64) -> String {
    format!("eirenyx-trivy-{policy}-{scan}-{generation}")
}

pub fn chaos_engine(policy: &str, experiment: &str) -> String {
    format!("eirenyx-litmus-{policy}-{experiment}")
}

pub fn policy_report(kind: Kind, policy: &str) -> String {
    format!("{kind}-report-{policy}")
}
