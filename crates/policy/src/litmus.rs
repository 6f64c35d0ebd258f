//! Litmus engine: one chaos engine object per declared experiment.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use eirenyx_api::labels::{self, LITMUS_EXPERIMENT_LABEL};
use eirenyx_api::litmus::{
    ApplicationParams, ChaosEngineSpec, EngineState, EnvEntry, ExperimentAttributes,
    ExperimentComponents, ExperimentEntry,
};
use eirenyx_api::policy::{LitmusExperiment, LitmusPolicySpec};
use eirenyx_api::{ChaosEngine, Kind, Policy, PolicyReport, TypedPolicy, naming};
use eirenyx_cluster::Cluster;
use eirenyx_core::{Error, Result};

use crate::Engine;
use crate::artifact::{self, Upsert};

pub struct LitmusEngine {
    cluster: Cluster,
}

impl LitmusEngine {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }
}

fn litmus_spec(policy: &Policy) -> Result<&LitmusPolicySpec> {
    match policy.spec.typed()? {
        TypedPolicy::Litmus(spec) => Ok(spec),
        _ => Err(Error::validation("litmus engine received a non-litmus policy")),
    }
}

/// Environment handed to the experiment: duration, mode, then parameters in key order.
pub fn experiment_env(experiment: &LitmusExperiment) -> Vec<EnvEntry> {
    let fixed = [
        ("TOTAL_CHAOS_DURATION", experiment.duration.as_deref()),
        ("CHAOS_MODE", experiment.mode.as_deref()),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        value
            .filter(|value| !value.is_empty())
            .map(|value| EnvEntry::new(name, value))
    });

    fixed
        .chain(
            experiment
                .parameters
                .iter()
                .map(|(name, value)| EnvEntry::new(name, value)),
        )
        .collect()
}

fn chaos_engine(policy: &Policy, experiment: &LitmusExperiment) -> ChaosEngine {
    let policy_name = policy.name_any();
    let policy_namespace = policy.namespace().unwrap_or_default();
    let namespace = experiment.namespace_or(&policy_namespace).to_string();

    // Engines may live outside the policy namespace, where owner references cannot point.
    ChaosEngine {
        metadata: ObjectMeta {
            name: Some(naming::chaos_engine(&policy_name, &experiment.name)),
            namespace: Some(namespace),
            labels: Some(artifact::artifact_labels(
                policy,
                &[(LITMUS_EXPERIMENT_LABEL, &experiment.name)],
            )),
            ..ObjectMeta::default()
        },
        spec: ChaosEngineSpec {
            appinfo: ApplicationParams {
                appns: experiment.app_info.app_namespace.clone(),
                applabel: experiment.app_info.app_label.clone(),
                appkind: experiment.app_info.app_kind.clone(),
            },
            engine_state: EngineState::Active,
            experiments: vec![ExperimentEntry {
                name: experiment.experiment_ref.clone(),
                spec: ExperimentAttributes {
                    components: ExperimentComponents {
                        env: experiment_env(experiment),
                    },
                },
            }],
        },
        status: None,
    }
}

#[async_trait]
impl Engine for LitmusEngine {
    fn validate(&self, policy: &Policy) -> Result<()> {
        let spec = litmus_spec(policy)?;
        if spec.experiments.is_empty() {
            return Err(Error::validation(
                "spec.litmus.experiments must contain at least one experiment",
            ));
        }
        for (i, experiment) in spec.experiments.iter().enumerate() {
            if experiment.name.is_empty() {
                return Err(Error::validation(format!(
                    "litmus.experiments[{i}].name is required"
                )));
            }
            if experiment.experiment_ref.is_empty() {
                return Err(Error::validation(format!(
                    "litmus.experiments[{i}].experimentRef is required"
                )));
            }
            let app = &experiment.app_info;
            if app.app_namespace.is_empty() || app.app_label.is_empty() || app.app_kind.is_empty() {
                return Err(Error::validation(format!(
                    "litmus.experiments[{i}].appInfo is incomplete"
                )));
            }
        }
        Ok(())
    }

    async fn reconcile(&self, policy: &Policy) -> Result<()> {
        let spec = litmus_spec(policy)?;
        let policy_name = policy.name_any();

        // Stops at the first failure; the next reconcile replays the whole list.
        for experiment in &spec.experiments {
            let desired = chaos_engine(policy, experiment);
            let outcome = artifact::upsert(
                self.cluster.chaos_engines.as_ref(),
                desired,
                |next, desired| next.spec = desired.spec.clone(),
            )
            .await?;
            if outcome == Upsert::Unchanged {
                debug!(policy = %policy_name, experiment = %experiment.name, "chaos engine in sync");
            } else {
                info!(policy = %policy_name, experiment = %experiment.name, outcome = ?outcome, "chaos engine synced");
            }
        }
        Ok(())
    }

    async fn cleanup(&self, policy: &Policy) -> Result<()> {
        let policy_name = policy.name_any();
        let selector = labels::in_policy_namespace(
            labels::policy_selector(&policy_name),
            &policy.namespace().unwrap_or_default(),
        );

        // Label lookup across all namespaces finds engines of experiments since removed from the policy.
        let engines = self.cluster.chaos_engines.list(None, &selector).await?;
        for engine in &engines {
            self.cluster
                .chaos_engines
                .delete(&engine.namespace().unwrap_or_default(), &engine.name_any())
                .await?;
        }
        let reports = artifact::delete_reports(&self.cluster, policy).await?;
        info!(policy = %policy_name, removed = engines.len(), reports, "litmus artifacts cleaned up");
        Ok(())
    }

    async fn generate_report(&self, policy: &Policy) -> Result<PolicyReport> {
        Ok(artifact::report_for(policy, Kind::Litmus))
    }
}
