#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Eirenyx Tools - package lifecycle manager
//!
//! Installs, upgrades and removes the chart behind each [`eirenyx_api::Tool`]
//! and probes the resulting workload for readiness.
//!
//! # Example
//!
//! ```ignore
//! let manager = PackageManager::new(cluster, Arc::new(HelmCli::new(config.clone())), config);
//! manager.ensure_installed(&tool, &cancel).await?;
//! let healthy = manager.wait_healthy(&tool, &cancel).await?;
//! ```

pub mod chart;
pub mod config;
pub mod health;
pub mod helm;
pub mod manager;
pub mod profile;
pub mod values;

pub use chart::{ChartClient, InMemoryCharts, ReleaseInfo, ReleaseRequest};
pub use config::ToolsConfig;
pub use helm::HelmCli;
pub use manager::{InstallOutcome, PackageManager};
pub use profile::{ToolProfile, Workload};
