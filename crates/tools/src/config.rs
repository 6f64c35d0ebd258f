//! Configuration for the package lifecycle manager.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the chart CLI path.
pub const HELM_PATH_ENV: &str = "EIRENYX_HELM_PATH";

/// Configuration for chart operations and readiness polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Path to the helm executable.
    pub helm_path: String,

    /// Repository registry file, created on first use.
    pub repository_config: PathBuf,

    /// Repository index cache directory, created on first use.
    pub repository_cache: PathBuf,

    /// Bounded wait for install and upgrade, unless the tool profile asks for longer.
    #[serde(with = "eirenyx_core::duration_secs")]
    pub install_timeout: Duration,

    #[serde(with = "eirenyx_core::duration_secs")]
    pub uninstall_timeout: Duration,

    /// Interval between readiness probes.
    #[serde(with = "eirenyx_core::duration_secs")]
    pub poll_interval: Duration,

    /// Ceiling after which polling reports not-ready.
    #[serde(with = "eirenyx_core::duration_secs")]
    pub poll_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            helm_path: "helm".to_string(),
            repository_config: PathBuf::from("/tmp/helm/repositories.yaml"),
            repository_cache: PathBuf::from("/tmp/helm/cache"),
            install_timeout: Duration::from_secs(5 * 60),
            uninstall_timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(3 * 60),
        }
    }
}

impl ToolsConfig {
    /// Set the helm executable.
    #[must_use]
    pub fn helm_path(mut self, path: impl Into<String>) -> Self {
        self.helm_path = path.into();
        self
    }

    /// Set the repository registry and cache locations.
    #[must_use]
    pub fn repository_paths(mut self, config: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        self.repository_config = config.into();
        self.repository_cache = cache.into();
        self
    }

    /// Set the readiness polling cadence.
    #[must_use]
    pub const fn polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    /// Apply environment overrides.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = std::env::var(HELM_PATH_ENV) {
            if !path.is_empty() {
                self.helm_path = path;
            }
        }
        self
    }
}
