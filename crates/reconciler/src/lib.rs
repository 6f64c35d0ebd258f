#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Eirenyx Reconciler - the Tool, Policy and PolicyReport controllers
//!
//! Tool and Policy share one finalizer-guarded state machine
//! ([`lifecycle::drive`]): every invocation derives the state from the
//! object, performs exactly one step and reports the [`Transition`] taken.
//! Cleanup always runs before a finalizer is released, so deleting an
//! object never leaves rendered artifacts or chart releases behind.
//!
//! PolicyReports are refreshed by the handler for their type and deleted
//! once the referenced Policy is gone.
//!
//! # Example
//!
//! ```ignore
//! let ctx = Arc::new(Context::new(cluster, charts, tools, config, cancel));
//! eirenyx_reconciler::run(client, ctx).await;
//! ```

pub mod context;
pub mod controller;
pub mod lifecycle;
pub mod policy;
pub mod report;
pub mod tool;

pub use context::{Context, ReconcilerConfig};
pub use controller::{error_policy, run};
pub use lifecycle::{Lifecycle, LifecycleState, Observed, Step, Transition, drive};
pub use policy::{PolicyLifecycle, reconcile_policy};
pub use report::reconcile_report;
pub use tool::{ToolLifecycle, reconcile_tool};
