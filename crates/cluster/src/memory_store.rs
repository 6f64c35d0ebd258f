//! In-memory stores mirroring the API server semantics the controllers rely on.
//!
//! - deletion of an object with finalizers only sets `deletionTimestamp`;
//!   the object disappears once a replace leaves the finalizer list empty
//! - `metadata.generation` moves only when the spec part of an object changes
//! - replace or status replace with a stale `resourceVersion` fails with `Conflict`
//! - every successful write bumps a counter so idempotence can be asserted

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use eirenyx_api::labels::{self, Selector};
use eirenyx_core::{Error, Result};

use crate::NamespacedObject;
use crate::store::{NamespaceStore, ObjectStore};

type Key = (String, String);

/// An [`ObjectStore`] holding objects in a map.
///
/// Unlike the API server, `create` keeps the status it is given so fixtures
/// can seed observed state (ready pod counts, scan summaries).
pub struct MemoryStore<K> {
    objects: RwLock<BTreeMap<Key, K>>,
    writes: AtomicUsize,
    versions: AtomicU64,
    failing: AtomicBool,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
            versions: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }
}

impl<K: NamespacedObject> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every stored object, in key order.
    pub async fn snapshot(&self) -> Vec<K> {
        self.objects.read().await.values().cloned().collect()
    }

    /// Make every later write fail with a transient error until turned off.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self, verb: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transient(
                format!("{verb} {}", kind_of::<K>()),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn kind_of<K: NamespacedObject>() -> String {
    K::kind(&()).into_owned()
}

fn key_of<K: NamespacedObject>(obj: &K) -> Result<Key> {
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::validation(format!("{} has no name", kind_of::<K>())))?;
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::validation(format!("{} '{name}' has no namespace", kind_of::<K>())))?;
    Ok((namespace, name))
}

/// The object without metadata and status, i.e. what drives `generation`.
fn spec_of<K: NamespacedObject>(obj: &K) -> Result<Value> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    Ok(value)
}

/// `obj` with the status taken from `source`.
fn with_status_of<K: NamespacedObject>(obj: &K, source: &K) -> Result<K> {
    let mut value = serde_json::to_value(obj)?;
    let status = serde_json::to_value(source)?
        .get("status")
        .cloned();
    if let Some(map) = value.as_object_mut() {
        match status {
            Some(status) => map.insert("status".to_string(), status),
            None => map.remove("status"),
        };
    }
    Ok(serde_json::from_value(value)?)
}

/// A write carrying a `resourceVersion` must match the stored one.
fn check_version<K: NamespacedObject>(current: &K, incoming: &K, name: &str) -> Result<()> {
    match &incoming.meta().resource_version {
        Some(version) if current.meta().resource_version.as_ref() != Some(version) => Err(
            Error::conflict(kind_of::<K>(), name, "the object has been modified"),
        ),
        _ => Ok(()),
    }
}

fn has_finalizers<K: NamespacedObject>(obj: &K) -> bool {
    !obj.finalizers().is_empty()
}

#[async_trait]
impl<K: NamespacedObject> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let objects = self.objects.read().await;
        Ok(objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .filter(|(_, obj)| labels::matches(obj.meta().labels.as_ref(), selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K> {
        self.check_writable("create")?;
        let key = key_of(obj)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(Error::conflict(kind_of::<K>(), key.1, "already exists"));
        }

        let mut stored = obj.clone();
        let meta = stored.meta_mut();
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.resource_version = Some(self.next_version());
        meta.generation = Some(1);
        meta.creation_timestamp = Some(Time(chrono::Utc::now()));
        meta.deletion_timestamp = None;

        objects.insert(key, stored.clone());
        self.record_write();
        Ok(stored)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        self.check_writable("replace")?;
        let key = key_of(obj)?;
        let mut objects = self.objects.write().await;
        let current = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(kind_of::<K>(), key.1.clone()))?;

        check_version(&current, obj, &key.1)?;

        let mut next = with_status_of(obj, &current)?;
        let generation = current.meta().generation.unwrap_or(1);
        let spec_changed = spec_of(&current)? != spec_of(&next)?;
        let meta = next.meta_mut();
        meta.uid.clone_from(&current.meta().uid);
        meta.creation_timestamp.clone_from(&current.meta().creation_timestamp);
        meta.deletion_timestamp.clone_from(&current.meta().deletion_timestamp);
        meta.generation = Some(if spec_changed { generation + 1 } else { generation });
        meta.resource_version = Some(self.next_version());

        self.record_write();
        if next.meta().deletion_timestamp.is_some() && !has_finalizers(&next) {
            objects.remove(&key);
        } else {
            objects.insert(key, next.clone());
        }
        Ok(next)
    }

    async fn replace_status(&self, obj: &K) -> Result<K> {
        self.check_writable("replace status")?;
        let key = key_of(obj)?;
        let mut objects = self.objects.write().await;
        let current = objects
            .get(&key)
            .ok_or_else(|| Error::not_found(kind_of::<K>(), key.1.clone()))?;
        check_version(current, obj, &key.1)?;

        let mut next = with_status_of(current, obj)?;
        next.meta_mut().resource_version = Some(self.next_version());

        objects.insert(key, next.clone());
        self.record_write();
        Ok(next)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        self.check_writable("delete")?;
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.write().await;
        let Some(current) = objects.get_mut(&key) else {
            return Ok(false);
        };

        if has_finalizers(current) {
            if current.meta().deletion_timestamp.is_none() {
                let meta = current.meta_mut();
                meta.deletion_timestamp = Some(Time(chrono::Utc::now()));
                meta.resource_version = Some(self.next_version());
            }
        } else {
            objects.remove(&key);
        }
        self.record_write();
        Ok(true)
    }
}

/// Namespaces known to the in-memory cluster.
#[derive(Default)]
pub struct MemoryNamespaces {
    names: RwLock<BTreeSet<String>>,
}

impl MemoryNamespaces {
    pub async fn contains(&self, name: &str) -> bool {
        self.names.read().await.contains(name)
    }
}

#[async_trait]
impl NamespaceStore for MemoryNamespaces {
    async fn ensure(&self, name: &str) -> Result<()> {
        self.names.write().await.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use eirenyx_api::{Tool, ToolSpec, ToolStatus};

    use super::*;

    fn config_map(name: &str, data: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), data.to_string())])),
            ..ConfigMap::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::<ConfigMap>::new();
        store.create(&config_map("a", "1")).await.unwrap();

        let fetched = store.get("default", "a").await.unwrap();
        assert!(fetched.is_some());
        assert!(store.get("other", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = MemoryStore::<ConfigMap>::new();
        store.create(&config_map("a", "1")).await.unwrap();
        let result = store.create(&config_map("a", "1")).await;
        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_generation_moves_only_on_spec_change() {
        let store = MemoryStore::<ConfigMap>::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();

        let same = store.replace(&created).await.unwrap();
        assert_eq!(same.metadata.generation, Some(1));

        let mut edited = same.clone();
        edited.data = Some(BTreeMap::from([("k".to_string(), "2".to_string())]));
        let edited = store.replace(&edited).await.unwrap();
        assert_eq!(edited.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let store = MemoryStore::<ConfigMap>::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        store.replace(&created).await.unwrap();

        let result = store.replace(&created).await;
        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_status_replace_clears_missing_fields() {
        let store = MemoryStore::<Tool>::new();
        let mut tool = Tool::new(
            "falco",
            ToolSpec {
                tool_type: "falco".to_string(),
                enabled: true,
                namespace: None,
                values: None,
            },
        );
        tool.metadata.namespace = Some("default".to_string());
        let created = store.create(&tool).await.unwrap();

        let mut installed = created.clone();
        installed.status = Some(ToolStatus {
            installed: true,
            version: Some("0.38.0".to_string()),
            ..ToolStatus::default()
        });
        let installed = store.replace_status(&installed).await.unwrap();

        let mut cleared = installed;
        cleared.status = Some(ToolStatus::default());
        store.replace_status(&cleared).await.unwrap();

        let stored = store.get("default", "falco").await.unwrap().unwrap();
        assert_eq!(stored.status, Some(ToolStatus::default()));
    }

    #[tokio::test]
    async fn test_stale_status_replace_conflicts() {
        let store = MemoryStore::<ConfigMap>::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        store.replace_status(&created).await.unwrap();

        let result = store.replace_status(&created).await;
        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_finalizer_blocks_delete_until_removed() {
        let store = MemoryStore::<ConfigMap>::new();
        let mut cm = config_map("a", "1");
        cm.metadata.finalizers = Some(vec!["example.com/guard".to_string()]);
        store.create(&cm).await.unwrap();

        assert!(store.delete("default", "a").await.unwrap());
        let pending = store.get("default", "a").await.unwrap().unwrap();
        assert!(pending.metadata.deletion_timestamp.is_some());

        let mut released = pending;
        released.metadata.finalizers = None;
        store.replace(&released).await.unwrap();
        assert!(store.get("default", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_reports_false() {
        let store = MemoryStore::<ConfigMap>::new();
        assert!(!store.delete("default", "missing").await.unwrap());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace_and_labels() {
        let store = MemoryStore::<ConfigMap>::new();
        let mut labelled = config_map("a", "1");
        labelled.metadata.labels = Some(BTreeMap::from([("team".to_string(), "x".to_string())]));
        store.create(&labelled).await.unwrap();
        store.create(&config_map("b", "1")).await.unwrap();

        let selector = BTreeMap::from([("team".to_string(), "x".to_string())]);
        assert_eq!(store.list(None, &selector).await.unwrap().len(), 1);
        assert_eq!(store.list(Some("default"), &Selector::new()).await.unwrap().len(), 2);
        assert!(store.list(Some("other"), &Selector::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::<ConfigMap>::new();
        store.create(&config_map("a", "1")).await.unwrap();

        store.fail_writes(true);
        assert!(matches!(
            store.delete("default", "a").await,
            Err(Error::Transient { .. })
        ));
        assert!(store.get("default", "a").await.unwrap().is_some());

        store.fail_writes(false);
        assert!(store.delete("default", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_ensure_is_idempotent() {
        let namespaces = MemoryNamespaces::default();
        namespaces.ensure("falco").await.unwrap();
        namespaces.ensure("falco").await.unwrap();
        assert!(namespaces.contains("falco").await);
    }
}
