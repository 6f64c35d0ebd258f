//! Shared state handed to every controller.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use eirenyx_cluster::Cluster;
use eirenyx_report::ReportHandlers;
use eirenyx_tools::{ChartClient, PackageManager, ToolsConfig};

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Interval between refreshes of a completed report.
    #[serde(with = "eirenyx_core::duration_secs")]
    pub report_refresh: Duration,

    /// Seed for Falco evidence sampling. Entropy when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub falco_seed: Option<u64>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            report_refresh: Duration::from_secs(5 * 60),
            falco_seed: None,
        }
    }
}

/// Everything a reconcile invocation needs.
pub struct Context {
    pub cluster: Cluster,
    pub packages: PackageManager,
    pub reports: ReportHandlers,
    pub config: ReconcilerConfig,
    /// Fires on shutdown; long-running chart and polling calls abort on it.
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(
        cluster: Cluster,
        charts: Arc<dyn ChartClient>,
        tools: ToolsConfig,
        config: ReconcilerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            packages: PackageManager::new(cluster.clone(), charts, tools),
            reports: ReportHandlers::new(cluster.clone(), config.falco_seed, config.report_refresh),
            cluster,
            config,
            cancel,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_refresh() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.report_refresh, Duration::from_secs(300));
        assert_eq!(config.falco_seed, None);
    }

    #[test]
    fn test_config_from_toml() {
        let config: ReconcilerConfig = toml::from_str("report_refresh = 60\nfalco_seed = 9").unwrap();
        assert_eq!(config.report_refresh, Duration::from_secs(60));
        assert_eq!(config.falco_seed, Some(9));
    }
}
