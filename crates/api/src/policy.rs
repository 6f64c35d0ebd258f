//! The `Policy` object: how one tool behaves against a set of targets.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use eirenyx_core::{Error, Result};

use crate::kind::Kind;

/// Finalizer guarding artifact cleanup before a Policy disappears.
pub const POLICY_FINALIZER: &str = "eirenyx.policy/finalizer";

/// Desired state of a Policy.
///
/// Exactly one of the type-specific sub-specs is populated, and it must match `type`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "eirenyx.eirenyx",
    version = "v1alpha1",
    kind = "Policy",
    plural = "policies",
    namespaced,
    status = "PolicyStatus",
    shortname = "pol",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Report", "type":"string", "jsonPath":".status.lastReport"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(rename = "type")]
    pub policy_type: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub target: PolicyTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub falco: Option<FalcoPolicySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trivy: Option<TrivyPolicySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub litmus: Option<LitmusPolicySpec>,
}

/// Namespaces and nodes a policy applies to. Empty lists mean "everywhere".
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_selector: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_selector: Vec<String>,
}

/// A borrowed view of the one populated sub-spec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedPolicy<'a> {
    Falco(&'a FalcoPolicySpec),
    Trivy(&'a TrivyPolicySpec),
    Litmus(&'a LitmusPolicySpec),
}

impl PolicySpec {
    /// Resolve the declared type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` for unknown tags.
    pub fn kind(&self) -> Result<Kind> {
        self.policy_type.parse()
    }

    /// Resolve the sub-spec matching the declared type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` for unknown tags and `Validation` when the
    /// matching sub-spec is missing or another sub-spec is also populated.
    pub fn typed(&self) -> Result<TypedPolicy<'_>> {
        let kind = self.kind()?;
        let populated = [
            self.falco.is_some(),
            self.trivy.is_some(),
            self.litmus.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();

        if populated > 1 {
            return Err(Error::validation(format!(
                "exactly one type-specific spec may be set for type={kind}"
            )));
        }

        match kind {
            Kind::Falco => self.falco.as_ref().map(TypedPolicy::Falco),
            Kind::Trivy => self.trivy.as_ref().map(TypedPolicy::Trivy),
            Kind::Litmus => self.litmus.as_ref().map(TypedPolicy::Litmus),
        }
        .ok_or_else(|| Error::validation(format!("spec.{kind} is required for type={kind}")))
    }
}

impl Policy {
    /// Current metadata generation, zero before the API server assigns one.
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }
}

// --- Falco ---

/// Falco rules rendered into the tool's rule document.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FalcoPolicySpec {
    #[serde(default)]
    pub rules: Vec<FalcoRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observe: Option<FalcoObserveSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<FalcoReportSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FalcoRule {
    pub name: String,
    pub condition: String,
    pub output: String,
    pub priority: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Which existing Falco rules the report should attribute findings to.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FalcoObserveSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_ref: Option<FalcoRuleRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_selector: Option<FalcoRuleSelector>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct FalcoRuleRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FalcoRuleSelector {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FalcoReportSpec {
    #[serde(default)]
    pub create: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_window: Option<String>,
}

impl FalcoPolicySpec {
    /// The rule findings are attributed to: the observed reference, else the first declared rule.
    pub fn observed_rule(&self) -> Option<&str> {
        self.observe
            .as_ref()
            .and_then(|observe| observe.rule_ref.as_ref())
            .map(|rule_ref| rule_ref.name.as_str())
            .or_else(|| self.rules.first().map(|rule| rule.name.as_str()))
    }
}

// --- Trivy ---

/// Image scans run as one-shot tasks.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrivyPolicySpec {
    #[serde(default)]
    pub scans: Vec<TrivyScan>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrivyScan {
    pub name: String,
    pub image: String,

    /// Comma-separated severities, e.g. `CRITICAL,HIGH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default)]
    pub ignore_unfixed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerability_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

// --- Litmus ---

/// Chaos experiments run through the chaos engine.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LitmusPolicySpec {
    #[serde(default)]
    pub experiments: Vec<LitmusExperiment>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LitmusExperiment {
    pub name: String,
    pub experiment_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_ref: Option<String>,

    /// Namespace the engine object is created in; the policy namespace when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    pub app_info: LitmusAppInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<LitmusExpectedResult>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LitmusAppInfo {
    #[serde(default)]
    pub app_namespace: String,
    #[serde(default)]
    pub app_label: String,
    #[serde(default)]
    pub app_kind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LitmusExpectedResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_chaos_error: Option<bool>,
}

impl LitmusExperiment {
    /// Namespace the engine object for this experiment lives in.
    pub fn namespace_or<'a>(&'a self, policy_namespace: &'a str) -> &'a str {
        self.target_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(policy_namespace)
    }
}

// --- Status ---

/// Lifecycle phase surfaced on `Policy.status.phase`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum PolicyPhase {
    Active,
    Disabled,
    Invalid,
}

/// Observed state of a Policy.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PolicyPhase>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_report: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
