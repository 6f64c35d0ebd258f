//! Stores backed by the Kubernetes API server.

use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use serde::Serialize;
use tracing::debug;

use eirenyx_api::labels::{self, Selector};
use eirenyx_core::{Error, Result};

use crate::NamespacedObject;
use crate::store::{NamespaceStore, ObjectStore};

/// An [`ObjectStore`] issuing requests through a shared kube client.
pub struct KubeStore<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _kind: PhantomData,
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..PostParams::default()
        }
    }
}

impl<K: NamespacedObject> KubeStore<K> {
    fn namespaced(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn scoped(&self, obj: &K) -> Result<(Api<K>, String)> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::validation(format!("{} has no namespace", obj.name_any())))?;
        Ok((self.namespaced(&namespace), obj.name_any()))
    }
}

#[async_trait]
impl<K: NamespacedObject> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.namespaced(namespace).get_opt(name).await?)
    }

    async fn list(&self, namespace: Option<&str>, selector: &Selector) -> Result<Vec<K>> {
        let api: Api<K> = match namespace {
            Some(namespace) => self.namespaced(namespace),
            None => Api::all(self.client.clone()),
        };
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&labels::to_selector_string(selector))
        };
        Ok(api.list(&params).await?.items)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let (api, name) = self.scoped(obj)?;
        debug!(name = %name, "creating object");
        Ok(api.create(&self.post_params(), obj).await?)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let (api, name) = self.scoped(obj)?;
        debug!(name = %name, "replacing object");
        Ok(api.replace(&name, &self.post_params(), obj).await?)
    }

    async fn replace_status(&self, obj: &K) -> Result<K> {
        let (api, name) = self.scoped(obj)?;
        debug!(name = %name, "replacing status");
        Ok(api
            .replace_status(&name, &self.post_params(), status_body(obj)?)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        // Background propagation so Jobs take their pods with them.
        match self
            .namespaced(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Request body for a status replace: the whole object.
///
/// Status fields missing from the body are cleared on the server, and the
/// carried `resourceVersion` turns a stale write into a `Conflict`.
fn status_body<K: Serialize>(obj: &K) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(obj)?)
}

/// Namespace bootstrap through the API server.
pub struct KubeNamespaces {
    client: Client,
}

impl KubeNamespaces {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceStore for KubeNamespaces {
    async fn ensure(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(name).await?.is_some() {
            return Ok(());
        }

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                debug!(namespace = %name, "created namespace");
                Ok(())
            }
            // Lost a race with another writer; the namespace exists either way.
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::Value;

    use eirenyx_api::{Tool, ToolSpec, ToolStatus};

    use super::*;

    fn installed_tool() -> Tool {
        let mut tool = Tool::new(
            "falco",
            ToolSpec {
                tool_type: "falco".to_string(),
                enabled: true,
                namespace: None,
                values: None,
            },
        );
        tool.metadata.namespace = Some("shop".to_string());
        tool.metadata.resource_version = Some("12".to_string());
        tool.status = Some(ToolStatus {
            installed: true,
            healthy: true,
            version: Some("0.38.0".to_string()),
            conditions: vec![],
        });
        tool
    }

    #[test]
    fn test_status_body_drops_cleared_fields() {
        let mut tool = installed_tool();
        tool.status = Some(ToolStatus::default());

        let body: Value = serde_json::from_slice(&status_body(&tool).unwrap()).unwrap();

        assert_eq!(body["status"]["installed"], false);
        assert!(body["status"].get("version").is_none());
        assert_eq!(body["kind"], "Tool");
    }

    #[test]
    fn test_status_body_carries_resource_version() {
        let body: Value = serde_json::from_slice(&status_body(&installed_tool()).unwrap()).unwrap();

        assert_eq!(body["metadata"]["resourceVersion"], "12");
        assert_eq!(body["status"]["version"], "0.38.0");
    }
}
