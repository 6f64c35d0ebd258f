//! Operator configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use eirenyx_reconciler::ReconcilerConfig;
use eirenyx_tools::ToolsConfig;

/// Top-level config, read from TOML. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Field manager recorded on every write.
    pub field_manager: String,

    pub tools: ToolsConfig,

    pub reconciler: ReconcilerConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            field_manager: "eirenyx".to_string(),
            tools: ToolsConfig::default(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Load from `path`, or defaults when no path is given. Environment
    /// overrides are applied last.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str::<Self>(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.tools = self.tools.with_env();
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_missing_path_gives_defaults() {
        let config = OperatorConfig::load(None).unwrap();
        assert_eq!(config.field_manager, "eirenyx");
        assert_eq!(config.reconciler.report_refresh, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "field_manager = \"eirenyx-dev\"\n\n[tools]\npoll_timeout = 60\n\n[reconciler]\nfalco_seed = 42\n",
        )
        .unwrap();

        let config = OperatorConfig::load(Some(&path)).unwrap();

        assert_eq!(config.field_manager, "eirenyx-dev");
        assert_eq!(config.tools.poll_timeout, Duration::from_secs(60));
        assert_eq!(config.tools.poll_interval, Duration::from_secs(5));
        assert_eq!(config.reconciler.falco_seed, Some(42));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tools = 3").unwrap();

        let err = OperatorConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let err = OperatorConfig::load(Some(Path::new("/nonexistent/eirenyx.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
