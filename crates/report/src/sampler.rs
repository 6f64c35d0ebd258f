//! Live pod inventory used as illustrative report evidence.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::Mutex;

use eirenyx_api::labels::Selector;
use eirenyx_cluster::Cluster;
use eirenyx_core::Result;

/// System and tool namespaces never sampled.
pub const EXCLUDED_NAMESPACES: [&str; 5] = [
    "kube-system",
    "eirenyx-system",
    "falco",
    "litmus",
    "trivy-system",
];

/// Upper bound (exclusive) of the synthetic finding count.
pub const MAX_FINDINGS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDetail {
    pub pod_name: String,
    pub namespace: String,
    pub containers: Vec<String>,
}

impl From<&Pod> for PodDetail {
    fn from(pod: &Pod) -> Self {
        Self {
            pod_name: pod.name_any(),
            namespace: pod.namespace().unwrap_or_default(),
            containers: pod
                .spec
                .as_ref()
                .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
        }
    }
}

/// Pod sampler backed by an injectable random source.
pub struct PodSampler {
    cluster: Cluster,
    rng: Mutex<StdRng>,
}

impl PodSampler {
    /// A sampler seeded with `seed`, or from OS entropy when `None`.
    pub fn new(cluster: Cluster, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            cluster,
            rng: Mutex::new(rng),
        }
    }

    /// Synthetic finding count in `[0, MAX_FINDINGS)`.
    pub async fn finding_count(&self) -> u32 {
        self.rng.lock().await.gen_range(0..MAX_FINDINGS)
    }

    /// Up to `count` distinct pods from namespaces outside [`EXCLUDED_NAMESPACES`].
    pub async fn sample(&self, count: usize) -> Result<Vec<PodDetail>> {
        let eligible: Vec<PodDetail> = self
            .cluster
            .pods
            .list(None, &Selector::new())
            .await?
            .iter()
            .filter(|pod| {
                let namespace = pod.namespace().unwrap_or_default();
                !EXCLUDED_NAMESPACES.contains(&namespace.as_str())
            })
            .map(PodDetail::from)
            .collect();

        let mut rng = self.rng.lock().await;
        Ok(eligible
            .choose_multiple(&mut *rng, count)
            .cloned()
            .collect())
    }
}
