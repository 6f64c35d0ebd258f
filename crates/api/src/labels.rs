//! Labeling convention for managed artifacts.
//!
//! Every artifact carries enough labels to be found again by a selector, so
//! cleanup never depends on in-memory state.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::policy::Policy;

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "eirenyx";
pub const POLICY_NAME_LABEL: &str = "eirenyx.eirenyx/policy-name";
pub const POLICY_TYPE_LABEL: &str = "eirenyx.eirenyx/policy-type";
pub const POLICY_NAMESPACE_LABEL: &str = "eirenyx.eirenyx/policy-namespace";
pub const TRIVY_SCAN_LABEL: &str = "eirenyx.eirenyx/trivy-scan-name";
pub const LITMUS_EXPERIMENT_LABEL: &str = "eirenyx.eirenyx/litmus-experiment";

/// An equality-based label selector.
pub type Selector = BTreeMap<String, String>;

/// Labels shared by every artifact of `policy`.
pub fn policy_labels(policy: &Policy) -> BTreeMap<String, String> {
    let mut labels = policy_selector(policy.metadata.name.as_deref().unwrap_or_default());
    labels.insert(
        POLICY_TYPE_LABEL.to_string(),
        policy.spec.policy_type.clone(),
    );
    if let Some(namespace) = &policy.metadata.namespace {
        labels.insert(POLICY_NAMESPACE_LABEL.to_string(), namespace.clone());
    }
    labels
}

/// Selector matching every managed artifact of the policy named `policy_name`.
pub fn policy_selector(policy_name: &str) -> Selector {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (POLICY_NAME_LABEL.to_string(), policy_name.to_string()),
    ])
}

/// Narrow `selector` to the policy's namespace, for cluster-wide listing.
#[must_use]
pub fn in_policy_namespace(mut selector: Selector, namespace: &str) -> Selector {
    selector.insert(POLICY_NAMESPACE_LABEL.to_string(), namespace.to_string());
    selector
}

/// Whether `labels` carries every pair in `selector`.
pub fn matches(labels: Option<&BTreeMap<String, String>>, selector: &Selector) -> bool {
    selector.iter().all(|(key, value)| {
        labels
            .and_then(|labels| labels.get(key))
            .is_some_and(|actual| actual == value)
    })
}

/// Render `selector` in the API server's `labelSelector` syntax.
pub fn to_selector_string(selector: &Selector) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .join(",")
}
