//! Shared fixtures for the workspace integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kube::api::ObjectMeta;
use tokio_util::sync::CancellationToken;

use eirenyx_api::{Policy, PolicySpec, Tool, ToolSpec};
use eirenyx_cluster::MemoryCluster;
use eirenyx_reconciler::{Context, ReconcilerConfig};
use eirenyx_tools::{InMemoryCharts, ToolsConfig};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const NAMESPACE: &str = "shop";

pub struct Harness {
    pub cluster: MemoryCluster,
    pub charts: Arc<InMemoryCharts>,
    pub ctx: Arc<Context>,
}

impl Harness {
    pub fn new() -> Self {
        let cluster = MemoryCluster::new();
        let charts = Arc::new(InMemoryCharts::new());
        let ctx = Arc::new(Context::new(
            cluster.handle(),
            charts.clone(),
            ToolsConfig::default().polling(Duration::from_secs(1), Duration::from_secs(10)),
            ReconcilerConfig {
                falco_seed: Some(11),
                ..ReconcilerConfig::default()
            },
            CancellationToken::new(),
        ));
        Self {
            cluster,
            charts,
            ctx,
        }
    }
}

pub fn tool(kind: &str) -> Tool {
    let mut tool = Tool::new(
        kind,
        ToolSpec {
            tool_type: kind.to_string(),
            enabled: true,
            namespace: None,
            values: None,
        },
    );
    tool.metadata.namespace = Some(NAMESPACE.to_string());
    tool
}

pub fn policy(name: &str, kind: &str, sub_spec: serde_json::Value) -> Result<Policy, serde_json::Error> {
    let mut spec = serde_json::json!({"type": kind, "enabled": true});
    spec[kind] = sub_spec;
    Ok(Policy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: serde_json::from_value::<PolicySpec>(spec)?,
        status: None,
    })
}
