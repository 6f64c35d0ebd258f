//! The chaos engine object consumed by the Litmus operator.
//!
//! Only the fields Eirenyx renders are modelled; the schema is owned upstream.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `litmuschaos.io/v1alpha1` ChaosEngine.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosEngine",
    namespaced,
    status = "ChaosEngineStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineSpec {
    #[serde(default)]
    pub appinfo: ApplicationParams,

    pub engine_state: EngineState,

    #[serde(default)]
    pub experiments: Vec<ExperimentEntry>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Active,
    Stop,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ApplicationParams {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub appns: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub applabel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub appkind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ExperimentEntry {
    pub name: String,
    #[serde(default)]
    pub spec: ExperimentAttributes,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ExperimentAttributes {
    #[serde(default)]
    pub components: ExperimentComponents,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ExperimentComponents {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvEntry>,
}

/// A plain name/value environment entry.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct EnvEntry {
    pub name: String,
    pub value: String,
}

impl EnvEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_status: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experiments: Vec<ExperimentStatus>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ExperimentStatus {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub verdict: String,
}
