//! Store traits over namespaced cluster objects.

use async_trait::async_trait;

use eirenyx_api::labels::Selector;
use eirenyx_core::Result;

/// Typed access to one kind of namespaced object.
///
/// Every write is safe to repeat: callers compare before writing and treat
/// conflicts as a reason to retry the whole reconcile.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch an object, `None` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// List objects carrying every label in `selector`, across all namespaces when `namespace` is `None`.
    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>>;

    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace the object's spec and metadata. Fails with `Conflict` on a stale resource version.
    async fn replace(&self, obj: &K) -> Result<K>;

    /// Replace only the status subresource.
    async fn replace_status(&self, obj: &K) -> Result<K>;

    /// Request deletion. Returns `false` when the object was already gone.
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Namespace bootstrap for tool installation.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Create the namespace if it does not exist yet.
    async fn ensure(&self, name: &str) -> Result<()>;
}
