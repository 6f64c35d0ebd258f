#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Eirenyx Policy - per-type policy engines
//!
//! Each engine turns a Policy into downstream artifacts:
//!
//! - Falco: one ConfigMap holding the rendered rule document
//! - Trivy: one scan Job per declared scan
//! - Litmus: one ChaosEngine per declared experiment
//!
//! [`PolicyEngine`] selects the engine from the declared type with an
//! exhaustive match; unknown types are rejected before any work happens.

pub mod artifact;
pub mod falco;
pub mod litmus;
pub mod trivy;

use async_trait::async_trait;

use eirenyx_api::{Kind, Policy, PolicyReport};
use eirenyx_cluster::Cluster;
use eirenyx_core::Result;

pub use falco::FalcoEngine;
pub use litmus::LitmusEngine;
pub use trivy::TrivyEngine;

/// Contract every policy engine fulfils.
///
/// All methods are idempotent: calling them again with an unchanged policy
/// performs no further writes.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Check the policy without touching the cluster.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed or incomplete specs.
    fn validate(&self, policy: &Policy) -> Result<()>;

    /// Bring the policy's artifacts in line with its spec.
    async fn reconcile(&self, policy: &Policy) -> Result<()>;

    /// Remove every artifact of the policy. Safe to call when nothing exists.
    async fn cleanup(&self, policy: &Policy) -> Result<()>;

    /// The report object describing the current policy generation.
    async fn generate_report(&self, policy: &Policy) -> Result<PolicyReport>;
}

/// The engine matching a policy's declared type.
pub enum PolicyEngine {
    Falco(FalcoEngine),
    Trivy(TrivyEngine),
    Litmus(LitmusEngine),
}

impl PolicyEngine {
    pub fn new(kind: Kind, cluster: Cluster) -> Self {
        match kind {
            Kind::Falco => Self::Falco(FalcoEngine::new(cluster)),
            Kind::Trivy => Self::Trivy(TrivyEngine::new(cluster)),
            Kind::Litmus => Self::Litmus(LitmusEngine::new(cluster)),
        }
    }

    /// Select the engine for `policy`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` when the declared type is unknown.
    pub fn for_policy(policy: &Policy, cluster: Cluster) -> Result<Self> {
        Ok(Self::new(policy.spec.kind()?, cluster))
    }

    fn inner(&self) -> &dyn Engine {
        match self {
            Self::Falco(engine) => engine,
            Self::Trivy(engine) => engine,
            Self::Litmus(engine) => engine,
        }
    }
}

#[async_trait]
impl Engine for PolicyEngine {
    fn validate(&self, policy: &Policy) -> Result<()> {
        self.inner().validate(policy)
    }

    async fn reconcile(&self, policy: &Policy) -> Result<()> {
        self.inner().reconcile(policy).await
    }

    async fn cleanup(&self, policy: &Policy) -> Result<()> {
        self.inner().cleanup(policy).await
    }

    async fn generate_report(&self, policy: &Policy) -> Result<PolicyReport> {
        self.inner().generate_report(policy).await
    }
}
