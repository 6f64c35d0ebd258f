#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Eirenyx Cluster - the injected cluster handle
//!
//! Every component receives a [`Cluster`] at construction time instead of
//! reaching for a process-wide client. The handle bundles one typed
//! [`ObjectStore`] per object kind the operator reads or writes, backed
//! either by the API server ([`Cluster::from_client`]) or by memory
//! ([`MemoryCluster`]) for tests.

pub mod kube_store;
pub mod memory_store;
pub mod store;

use std::fmt::Debug;
use std::sync::Arc;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use serde::Serialize;
use serde::de::DeserializeOwned;

use eirenyx_api::{ChaosEngine, Policy, PolicyReport, Tool, VulnerabilityReport};

pub use kube_store::{KubeNamespaces, KubeStore};
pub use memory_store::{MemoryNamespaces, MemoryStore};
pub use store::{NamespaceStore, ObjectStore};

/// Bounds shared by every namespaced object the stores handle.
pub trait NamespacedObject:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedObject for K where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Handle to every object kind the operator touches.
#[derive(Clone)]
pub struct Cluster {
    pub tools: Arc<dyn ObjectStore<Tool>>,
    pub policies: Arc<dyn ObjectStore<Policy>>,
    pub reports: Arc<dyn ObjectStore<PolicyReport>>,
    pub config_maps: Arc<dyn ObjectStore<ConfigMap>>,
    pub jobs: Arc<dyn ObjectStore<Job>>,
    pub chaos_engines: Arc<dyn ObjectStore<ChaosEngine>>,
    pub vulnerability_reports: Arc<dyn ObjectStore<VulnerabilityReport>>,
    pub pods: Arc<dyn ObjectStore<Pod>>,
    pub daemon_sets: Arc<dyn ObjectStore<DaemonSet>>,
    pub deployments: Arc<dyn ObjectStore<Deployment>>,
    pub namespaces: Arc<dyn NamespaceStore>,
}

impl Cluster {
    /// Stores talking to the API server, writing as `field_manager`.
    pub fn from_client(client: kube::Client, field_manager: &str) -> Self {
        fn store<K: NamespacedObject>(
            client: &kube::Client,
            field_manager: &str,
        ) -> Arc<dyn ObjectStore<K>> {
            Arc::new(KubeStore::<K>::new(client.clone(), field_manager))
        }

        Self {
            tools: store(&client, field_manager),
            policies: store(&client, field_manager),
            reports: store(&client, field_manager),
            config_maps: store(&client, field_manager),
            jobs: store(&client, field_manager),
            chaos_engines: store(&client, field_manager),
            vulnerability_reports: store(&client, field_manager),
            pods: store(&client, field_manager),
            daemon_sets: store(&client, field_manager),
            deployments: store(&client, field_manager),
            namespaces: Arc::new(KubeNamespaces::new(client)),
        }
    }
}

/// An in-memory cluster whose concrete stores stay reachable for assertions.
#[derive(Default, Clone)]
pub struct MemoryCluster {
    pub tools: Arc<MemoryStore<Tool>>,
    pub policies: Arc<MemoryStore<Policy>>,
    pub reports: Arc<MemoryStore<PolicyReport>>,
    pub config_maps: Arc<MemoryStore<ConfigMap>>,
    pub jobs: Arc<MemoryStore<Job>>,
    pub chaos_engines: Arc<MemoryStore<ChaosEngine>>,
    pub vulnerability_reports: Arc<MemoryStore<VulnerabilityReport>>,
    pub pods: Arc<MemoryStore<Pod>>,
    pub daemon_sets: Arc<MemoryStore<DaemonSet>>,
    pub deployments: Arc<MemoryStore<Deployment>>,
    pub namespaces: Arc<MemoryNamespaces>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`Cluster`] view over the same stores.
    pub fn handle(&self) -> Cluster {
        Cluster {
            tools: self.tools.clone(),
            policies: self.policies.clone(),
            reports: self.reports.clone(),
            config_maps: self.config_maps.clone(),
            jobs: self.jobs.clone(),
            chaos_engines: self.chaos_engines.clone(),
            vulnerability_reports: self.vulnerability_reports.clone(),
            pods: self.pods.clone(),
            daemon_sets: self.daemon_sets.clone(),
            deployments: self.deployments.clone(),
            namespaces: self.namespaces.clone(),
        }
    }

    /// Writes to artifact stores (ConfigMaps, Jobs, ChaosEngines).
    pub fn artifact_writes(&self) -> usize {
        self.config_maps.writes() + self.jobs.writes() + self.chaos_engines.writes()
    }
}
