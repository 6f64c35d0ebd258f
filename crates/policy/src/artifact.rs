//! Shared plumbing for writing policy artifacts.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::debug;

use eirenyx_api::labels;
use eirenyx_api::{Kind, Policy, PolicyRef, PolicyReport, PolicyReportSpec, naming};
use eirenyx_cluster::{Cluster, NamespacedObject, ObjectStore};
use eirenyx_core::Result;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    Unchanged,
}

/// Create `desired` if absent, else overwrite the managed parts of the existing object.
///
/// Labels are merged and owner references replaced; `apply` copies the
/// type-specific content. Nothing is written when the result equals what is stored.
pub async fn upsert<K, F>(store: &dyn ObjectStore<K>, desired: K, apply: F) -> Result<Upsert>
where
    K: NamespacedObject + PartialEq,
    F: FnOnce(&mut K, &K) + Send,
{
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();

    let Some(existing) = store.get(&namespace, &name).await? else {
        store.create(&desired).await?;
        debug!(namespace = %namespace, name = %name, "artifact created");
        return Ok(Upsert::Created);
    };

    let mut next = existing.clone();
    next.labels_mut().extend(desired.labels().clone());
    if !desired.owner_references().is_empty() {
        *next.owner_references_mut() = desired.owner_references().to_vec();
    }
    apply(&mut next, &desired);

    if next == existing {
        return Ok(Upsert::Unchanged);
    }
    store.replace(&next).await?;
    debug!(namespace = %namespace, name = %name, "artifact updated");
    Ok(Upsert::Updated)
}

/// Metadata for an artifact of `policy` living in the policy's namespace.
pub fn owned_meta(policy: &Policy, name: String, extra: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: policy.namespace(),
        labels: Some(artifact_labels(policy, extra)),
        owner_references: owner_reference(policy).map(|owner| vec![owner]),
        ..ObjectMeta::default()
    }
}

pub fn artifact_labels(policy: &Policy, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut labels = labels::policy_labels(policy);
    labels.extend(
        extra
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string())),
    );
    labels
}

/// Controller reference back to `policy`, absent until the API server assigned a uid.
fn owner_reference(policy: &Policy) -> Option<OwnerReference> {
    policy.controller_owner_ref(&())
}

/// The report object describing the current generation of `policy`.
pub fn report_for(policy: &Policy, kind: Kind) -> PolicyReport {
    let policy_name = policy.name_any();
    let mut report = PolicyReport::new(
        &naming::policy_report(kind, &policy_name),
        PolicyReportSpec {
            policy_ref: PolicyRef {
                name: policy_name.clone(),
                generation: policy.generation(),
            },
            report_type: kind.to_string(),
        },
    );
    report.metadata.namespace = policy.namespace();
    report.metadata.labels = Some(labels::policy_selector(&policy_name));
    report
}

/// Delete every report in the policy namespace that references `policy`.
pub async fn delete_reports(cluster: &Cluster, policy: &Policy) -> Result<usize> {
    let namespace = policy.namespace().unwrap_or_default();
    let policy_name = policy.name_any();
    let mut deleted = 0;
    for report in cluster
        .reports
        .list(Some(&namespace), &labels::Selector::new())
        .await?
        .into_iter()
        .filter(|report| report.spec.policy_ref.name == policy_name)
    {
        if cluster.reports.delete(&namespace, &report.name_any()).await? {
            deleted += 1;
        }
    }
    Ok(deleted)
}
