//! Falco engine: renders the policy's rules into one rule document.

use std::collections::BTreeMap;

use async_trait::async_trait;
use itertools::Itertools;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, info};

use eirenyx_api::policy::{FalcoPolicySpec, PolicyTarget};
use eirenyx_api::{Kind, Policy, PolicyReport, TypedPolicy, naming};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};

use crate::Engine;
use crate::artifact::{self, Upsert};

/// One entry of the rendered rule document.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct RenderedRule {
    rule: String,
    desc: String,
    condition: String,
    output: String,
    priority: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

pub struct FalcoEngine {
    cluster: Cluster,
}

impl FalcoEngine {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }
}

fn falco_spec(policy: &Policy) -> Result<&FalcoPolicySpec> {
    match policy.spec.typed()? {
        TypedPolicy::Falco(spec) => Ok(spec),
        _ => Err(Error::validation("falco engine received a non-falco policy")),
    }
}

/// AND the target scoping clauses onto `condition`.
///
/// A single value becomes an equality clause, several values an `in` clause.
pub fn scope_condition(condition: &str, target: &PolicyTarget) -> String {
    let condition = condition.trim();
    let clauses: Vec<String> = [
        ("k8s.ns.name", &target.namespace_selector),
        ("k8s.node.name", &target.node_selector),
    ]
    .into_iter()
    .filter_map(|(field, values)| match values.as_slice() {
        [] => None,
        [single] => Some(format!("{field} = \"{single}\"")),
        many => Some(format!(
            "{field} in ({})",
            many.iter().map(|value| format!("\"{value}\"")).join(", ")
        )),
    })
    .collect();

    if clauses.is_empty() {
        condition.to_string()
    } else {
        format!("({condition}) and ({})", clauses.join(" and "))
    }
}

/// Render the rule document, rules sorted by name.
///
/// # Errors
///
/// Returns `Yaml` if serialization fails.
pub fn render_rules(policy_name: &str, spec: &FalcoPolicySpec, target: &PolicyTarget) -> Result<String> {
    let rules: Vec<RenderedRule> = spec
        .rules
        .iter()
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .map(|rule| RenderedRule {
            rule: rule.name.clone(),
            desc: format!("Managed by Eirenyx policy {policy_name}"),
            condition: scope_condition(&rule.condition, target),
            output: rule.output.trim_end().to_string(),
            priority: rule.priority.clone(),
            tags: rule.tags.clone(),
        })
        .collect();
    Ok(serde_yaml::to_string(&rules)?)
}

#[async_trait]
impl Engine for FalcoEngine {
    fn validate(&self, policy: &Policy) -> Result<()> {
        let spec = falco_spec(policy)?;
        if spec.rules.is_empty() {
            return Err(Error::validation(
                "spec.falco.rules must contain at least one rule",
            ));
        }
        for (i, rule) in spec.rules.iter().enumerate() {
            for (field, value) in [
                ("name", &rule.name),
                ("condition", &rule.condition),
                ("output", &rule.output),
                ("priority", &rule.priority),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::validation(format!(
                        "falco rule[{i}].{field} is required"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn reconcile(&self, policy: &Policy) -> Result<()> {
        let spec = falco_spec(policy)?;
        let policy_name = policy.name_any();
        let document = render_rules(&policy_name, spec, &policy.spec.target)?;

        let desired = ConfigMap {
            metadata: artifact::owned_meta(policy, naming::falco_config_map(&policy_name), &[]),
            data: Some(BTreeMap::from([(
                naming::FALCO_RULES_KEY.to_string(),
                document,
            )])),
            ..ConfigMap::default()
        };

        let outcome = artifact::upsert(self.cluster.config_maps.as_ref(), desired, |next, desired| {
            let data = next.data.get_or_insert_with(BTreeMap::new);
            data.extend(desired.data.clone().unwrap_or_default());
        })
        .await?;

        if outcome == Upsert::Unchanged {
            debug!(policy = %policy_name, "falco rules already in sync");
        } else {
            info!(policy = %policy_name, outcome = ?outcome, rules = spec.rules.len(), "falco rules synced");
        }
        Ok(())
    }

    async fn cleanup(&self, policy: &Policy) -> Result<()> {
        let policy_name = policy.name_any();
        let namespace = policy.namespace().unwrap_or_default();
        let removed = self
            .cluster
            .config_maps
            .delete(&namespace, &naming::falco_config_map(&policy_name))
            .await?;
        let reports = artifact::delete_reports(&self.cluster, policy).await?;
        info!(policy = %policy_name, removed, reports, "falco artifacts cleaned up");
        Ok(())
    }

    async fn generate_report(&self, policy: &Policy) -> Result<PolicyReport> {
        Ok(artifact::report_for(policy, Kind::Falco))
    }
}
