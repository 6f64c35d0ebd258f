#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # Eirenyx
//!
//! Declarative security and chaos-testing tooling for Kubernetes.
//!
//! The binary wires the controllers from `eirenyx-reconciler` to a live
//! cluster; this library holds its CLI and configuration and re-exports the
//! workspace crates for convenience.

pub mod cli;
pub mod config;

pub use eirenyx_api;
pub use eirenyx_cluster;
pub use eirenyx_core;
pub use eirenyx_policy;
pub use eirenyx_reconciler;
pub use eirenyx_report;
pub use eirenyx_tools;
