//! The `Tool` object: one installable security or chaos-testing capability.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use eirenyx_core::Result;

use crate::kind::Kind;

/// Finalizer guarding chart removal before a Tool disappears.
pub const TOOL_FINALIZER: &str = "eirenyx.tool/finalizer";

/// Desired state of a Tool.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "eirenyx.eirenyx",
    version = "v1alpha1",
    kind = "Tool",
    namespaced,
    status = "ToolStatus",
    shortname = "tool",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Enabled", "type":"boolean", "jsonPath":".spec.enabled"}"#,
    printcolumn = r#"{"name":"Healthy", "type":"boolean", "jsonPath":".status.healthy"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// One of `falco`, `trivy`, `litmus`.
    #[serde(rename = "type")]
    pub tool_type: String,

    #[serde(default)]
    pub enabled: bool,

    /// Install namespace; the tool's conventional namespace when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Chart values merged over the tool's baseline values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::schema::preserve_unknown_fields")]
    pub values: Option<serde_json::Value>,
}

impl ToolSpec {
    /// Resolve the declared type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` when the type is not one of the managed kinds.
    pub fn kind(&self) -> Result<Kind> {
        self.tool_type.parse()
    }
}

/// Observed state of a Tool.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    #[serde(default)]
    pub installed: bool,

    #[serde(default)]
    pub healthy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
