//! Object store backed by a `kube::Client`.

use super::kubectl::KustomizeApplier;
use super::ObjectStore;
use crate::errors::StoreError;
use crate::resources::{ObjectKey, ObjectKind, ResourceSpec};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Builds the dynamic API descriptor for a kind.
pub(crate) fn api_resource(kind: ObjectKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
    ApiResource::from_gvk_with_plural(&gvk, kind.plural())
}

/// Maps a client error onto a [`StoreError`] by API status code.
pub(crate) fn store_error(err: kube::Error, kind: ObjectKind, key: &ObjectKey) -> StoreError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::not_found(kind.kind(), key.to_string()),
            409 => StoreError::AlreadyExists {
                kind: kind.kind().to_string(),
                name: key.to_string(),
            },
            400 | 401 | 403 | 405 | 422 => {
                StoreError::Rejected(format!("{kind} '{key}': {} ({})", response.message, response.reason))
            }
            429 | 500..=599 => StoreError::Unavailable(format!("{kind} '{key}': {}", response.message)),
            code => StoreError::Command(format!("{kind} '{key}': unexpected status {code}: {}", response.message)),
        },
        kube::Error::HyperError(e) => StoreError::Unavailable(e.to_string()),
        kube::Error::Service(e) => StoreError::Unavailable(e.to_string()),
        kube::Error::SerdeError(e) => StoreError::Malformed(format!("{kind} '{key}': {e}")),
        other => StoreError::Command(other.to_string()),
    }
}

fn decode<K: DeserializeOwned>(spec: &ResourceSpec) -> Result<K, StoreError> {
    serde_json::from_value(spec.body().clone())
        .map_err(|e| StoreError::Malformed(format!("{} '{}': {e}", spec.kind(), spec.key())))
}

fn encode<K: Serialize>(object: &K, kind: ObjectKind, key: &ObjectKey) -> Result<Value, StoreError> {
    serde_json::to_value(object).map_err(|e| StoreError::Malformed(format!("{kind} '{key}': {e}")))
}

fn namespace_of(kind: ObjectKind, key: &ObjectKey) -> Result<&str, StoreError> {
    key.namespace
        .as_deref()
        .ok_or_else(|| StoreError::Rejected(format!("{kind} '{key}' needs a namespace")))
}

/// Reads and creates objects through the Kubernetes API and applies manifest
/// sets with kustomize.
#[derive(Clone)]
pub struct ClusterStore {
    client: Client,
    kustomize: KustomizeApplier,
}

impl fmt::Debug for ClusterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterStore")
            .field("kustomize", &self.kustomize)
            .finish_non_exhaustive()
    }
}

impl ClusterStore {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client, kustomize: KustomizeApplier) -> Self {
        Self { client, kustomize }
    }

    /// Connects using the kubeconfig, or the in-cluster config when no
    /// kubeconfig is found. `context` selects a kubeconfig context.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if no usable configuration is found.
    pub async fn connect(context: Option<&str>, kustomize: KustomizeApplier) -> Result<Self, StoreError> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| StoreError::Rejected(format!("kubeconfig context '{context}': {e}")))?
            }
            None => Config::infer()
                .await
                .map_err(|e| StoreError::Rejected(format!("no cluster configuration: {e}")))?,
        };
        let client = Client::try_from(config).map_err(|e| StoreError::Rejected(e.to_string()))?;
        Ok(Self::new(client, kustomize))
    }

    fn dynamic(&self, kind: ObjectKind, key: &ObjectKey) -> Result<Api<DynamicObject>, StoreError> {
        let namespace = namespace_of(kind, key)?;
        Ok(Api::namespaced_with(self.client.clone(), namespace, &api_resource(kind)))
    }

    fn deployments(&self, key: &ObjectKey) -> Result<Api<Deployment>, StoreError> {
        let namespace = namespace_of(ObjectKind::Deployment, key)?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ObjectStore for ClusterStore {
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> Result<Value, StoreError> {
        debug!(%kind, %key, "Fetching object");
        let name = key.name.as_str();
        let fail = |e| store_error(e, kind, key);
        match kind {
            ObjectKind::Namespace => {
                let ns = self.namespaces().get(name).await.map_err(fail)?;
                encode(&ns, kind, key)
            }
            ObjectKind::Deployment => {
                let deploy = self.deployments(key)?.get(name).await.map_err(fail)?;
                encode(&deploy, kind, key)
            }
            ObjectKind::CassandraDatacenter | ObjectKind::Reaper => {
                let object = self.dynamic(kind, key)?.get(name).await.map_err(fail)?;
                encode(&object, kind, key)
            }
        }
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<(), StoreError> {
        let (kind, key) = (spec.kind(), spec.key());
        debug!(%kind, %key, "Creating object");
        let params = PostParams::default();
        let fail = |e| store_error(e, kind, key);
        match kind {
            ObjectKind::Namespace => {
                let ns: Namespace = decode(spec)?;
                self.namespaces().create(&params, &ns).await.map_err(fail)?;
            }
            ObjectKind::Deployment => {
                let deploy: Deployment = decode(spec)?;
                self.deployments(key)?.create(&params, &deploy).await.map_err(fail)?;
            }
            ObjectKind::CassandraDatacenter | ObjectKind::Reaper => {
                let object: DynamicObject = decode(spec)?;
                self.dynamic(kind, key)?.create(&params, &object).await.map_err(fail)?;
            }
        }
        Ok(())
    }

    async fn apply_manifests(&self, namespace: &str, manifest_set: &str) -> Result<(), StoreError> {
        self.kustomize.apply(namespace, manifest_set).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{NamespaceDescriptor, ReaperDescriptor};
    use kube::core::ErrorResponse;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key() -> ObjectKey {
        ObjectKey::namespaced("deploy-reaper-test", "reaper-test")
    }

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        let response: ErrorResponse = serde_json::from_value(json!({
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code,
        }))
        .unwrap();
        kube::Error::Api(response)
    }

    #[test]
    fn test_not_found_by_status_code() {
        let err = store_error(
            api_error(404, "NotFound", "cassandradatacenters \"reaper-test\" not found"),
            ObjectKind::CassandraDatacenter,
            &key(),
        );
        assert_eq!(
            err,
            StoreError::not_found("CassandraDatacenter", "deploy-reaper-test/reaper-test")
        );
        assert!(err.class().is_transient());
    }

    #[test]
    fn test_conflict_is_already_exists() {
        let err = store_error(api_error(409, "AlreadyExists", "exists"), ObjectKind::Reaper, &key());
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert!(!err.class().is_transient());
    }

    #[test]
    fn test_forbidden_is_permanent_whatever_the_wording() {
        for code in [403, 422] {
            let err = store_error(
                api_error(code, "", "user \"ci\" may not read this resource"),
                ObjectKind::Reaper,
                &key(),
            );
            assert!(matches!(err, StoreError::Rejected(_)), "{code}: {err:?}");
            assert!(!err.class().is_transient());
        }
    }

    #[test]
    fn test_server_errors_are_unavailable() {
        for code in [429, 500, 503] {
            let err = store_error(api_error(code, "ServiceUnavailable", "try again"), ObjectKind::Deployment, &key());
            assert!(matches!(err, StoreError::Unavailable(_)), "{code}: {err:?}");
        }
    }

    #[test]
    fn test_api_resource_for_custom_kinds() {
        let ar = api_resource(ObjectKind::CassandraDatacenter);
        assert_eq!(ar.group, "cassandra.datastax.com");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.plural, "cassandradatacenters");
        assert_eq!(ar.api_version, ObjectKind::CassandraDatacenter.api_version());

        let ar = api_resource(ObjectKind::Reaper);
        assert_eq!(ar.api_version, ObjectKind::Reaper.api_version());
        assert_eq!(ar.kind, "Reaper");
    }

    #[test]
    fn test_core_kinds_share_api_version() {
        assert_eq!(api_resource(ObjectKind::Namespace).api_version, "v1");
        assert_eq!(api_resource(ObjectKind::Deployment).api_version, "apps/v1");
    }

    #[test]
    fn test_descriptors_decode_into_api_objects() {
        let ns: Namespace = decode(&NamespaceDescriptor::new("deploy-reaper-test").build().unwrap()).unwrap();
        assert_eq!(ns.metadata.name.as_deref(), Some("deploy-reaper-test"));

        let spec = ReaperDescriptor::builder()
            .namespace("deploy-reaper-test")
            .name("cass-backend")
            .cluster_name("reaper-test")
            .cassandra_service("reaper-test-reaper-test-service")
            .build()
            .unwrap();
        let object: DynamicObject = decode(&spec).unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("cass-backend"));
        assert_eq!(object.metadata.namespace.as_deref(), Some("deploy-reaper-test"));
        assert_eq!(
            object.types.map(|t| t.kind),
            Some("Reaper".to_string())
        );
        assert_eq!(object.data["spec"], spec.body()["spec"]);
    }

    #[test]
    fn test_namespaced_kind_without_namespace() {
        let err = namespace_of(ObjectKind::Reaper, &ObjectKey::cluster_scoped("cass-backend")).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }
}
