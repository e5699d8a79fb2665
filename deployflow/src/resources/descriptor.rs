//! Validated constructors for the objects a run creates.

use crate::errors::DescriptorError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// The object kinds the harness reads or creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// `v1/Namespace`
    Namespace,
    /// `apps/v1/Deployment`
    Deployment,
    /// `cassandra.datastax.com/v1beta1/CassandraDatacenter`
    CassandraDatacenter,
    /// `reaper.cassandra-reaper.io/v1alpha1/Reaper`
    Reaper,
}

impl ObjectKind {
    /// The `kind` field of the object.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::Deployment => "Deployment",
            Self::CassandraDatacenter => "CassandraDatacenter",
            Self::Reaper => "Reaper",
        }
    }

    /// The `apiVersion` field of the object.
    #[must_use]
    pub const fn api_version(self) -> &'static str {
        match self {
            Self::Namespace => "v1",
            Self::Deployment => "apps/v1",
            Self::CassandraDatacenter => "cassandra.datastax.com/v1beta1",
            Self::Reaper => "reaper.cassandra-reaper.io/v1alpha1",
        }
    }

    /// API group, empty for the core group.
    #[must_use]
    pub const fn group(self) -> &'static str {
        match self {
            Self::Namespace => "",
            Self::Deployment => "apps",
            Self::CassandraDatacenter => "cassandra.datastax.com",
            Self::Reaper => "reaper.cassandra-reaper.io",
        }
    }

    /// API version within the group.
    #[must_use]
    pub const fn version(self) -> &'static str {
        match self {
            Self::Namespace | Self::Deployment => "v1",
            Self::CassandraDatacenter => "v1beta1",
            Self::Reaper => "v1alpha1",
        }
    }

    /// Plural resource name used in API paths.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Namespace => "namespaces",
            Self::Deployment => "deployments",
            Self::CassandraDatacenter => "cassandradatacenters",
            Self::Reaper => "reapers",
        }
    }

    /// Returns false for cluster-scoped kinds.
    #[must_use]
    pub const fn is_namespaced(self) -> bool {
        !matches!(self, Self::Namespace)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Namespaced name of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Creates a key for a namespaced object.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Creates a key for a cluster-scoped object.
    #[must_use]
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A fully validated object ready to be created.
///
/// Only descriptors construct these, so a `ResourceSpec` always carries every
/// identifier its kind requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    kind: ObjectKind,
    key: ObjectKey,
    body: Value,
}

impl ResourceSpec {
    /// Returns the object kind.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Returns the object key.
    #[must_use]
    pub const fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Returns the full object manifest.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Consumes the spec and returns the manifest.
    #[must_use]
    pub fn into_body(self) -> Value {
        self.body
    }
}

fn required(
    kind: &'static str,
    field: &'static str,
    value: Option<&String>,
) -> Result<String, DescriptorError> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DescriptorError::MissingField { kind, field }),
    }
}

/// Describes a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDescriptor {
    name: String,
}

impl NamespaceDescriptor {
    /// Creates a namespace descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Builds the namespace manifest.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::MissingField` if the name is blank.
    pub fn build(&self) -> Result<ResourceSpec, DescriptorError> {
        let name = required("Namespace", "name", Some(&self.name))?;
        let kind = ObjectKind::Namespace;
        Ok(ResourceSpec {
            kind,
            body: json!({
                "apiVersion": kind.api_version(),
                "kind": kind.kind(),
                "metadata": { "name": name },
            }),
            key: ObjectKey::cluster_scoped(name),
        })
    }
}

/// Where Reaper keeps its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Persist to a Cassandra cluster.
    #[default]
    Cassandra,
    /// Keep everything in memory.
    Memory,
}

impl StorageType {
    /// The value used in the Reaper `serverConfig.storageType` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cassandra => "cassandra",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a `Reaper` custom resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaperDescriptor;

impl ReaperDescriptor {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> ReaperDescriptorBuilder {
        ReaperDescriptorBuilder::default()
    }
}

/// Builder for a `Reaper` manifest.
#[derive(Debug, Clone, Default)]
pub struct ReaperDescriptorBuilder {
    namespace: Option<String>,
    name: Option<String>,
    cluster_name: Option<String>,
    cassandra_service: Option<String>,
    credentials_secret: Option<String>,
    storage_type: StorageType,
}

impl ReaperDescriptorBuilder {
    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the object name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the Cassandra cluster name used as the backend.
    #[must_use]
    pub fn cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.cluster_name = Some(cluster_name.into());
        self
    }

    /// Sets the Cassandra service Reaper connects to.
    #[must_use]
    pub fn cassandra_service(mut self, service: impl Into<String>) -> Self {
        self.cassandra_service = Some(service.into());
        self
    }

    /// Sets the secret holding Cassandra credentials.
    #[must_use]
    pub fn credentials_secret(mut self, secret: impl Into<String>) -> Self {
        self.credentials_secret = Some(secret.into());
        self
    }

    /// Sets the storage type. Defaults to [`StorageType::Cassandra`].
    #[must_use]
    pub const fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    /// Validates the fields and builds the manifest.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::MissingField` for a blank identifier, or
    /// `DescriptorError::Inconsistent` if a Cassandra backend is given for
    /// memory storage.
    pub fn build(self) -> Result<ResourceSpec, DescriptorError> {
        const KIND: &str = "Reaper";
        let namespace = required(KIND, "namespace", self.namespace.as_ref())?;
        let name = required(KIND, "name", self.name.as_ref())?;

        let mut server_config = json!({ "storageType": self.storage_type.as_str() });

        match self.storage_type {
            StorageType::Cassandra => {
                let cluster_name = required(KIND, "cluster_name", self.cluster_name.as_ref())?;
                let service = required(KIND, "cassandra_service", self.cassandra_service.as_ref())?;
                let mut backend = json!({
                    "clusterName": cluster_name,
                    "cassandraService": service,
                });
                if let Some(secret) = self.credentials_secret.filter(|s| !s.trim().is_empty()) {
                    backend["cassandraUserSecretName"] = Value::String(secret);
                }
                server_config["cassandraBackend"] = backend;
            }
            StorageType::Memory => {
                if self.cluster_name.is_some() || self.cassandra_service.is_some() {
                    return Err(DescriptorError::Inconsistent {
                        kind: KIND,
                        reason: "a Cassandra backend was given for memory storage".to_string(),
                    });
                }
            }
        }

        let kind = ObjectKind::Reaper;
        Ok(ResourceSpec {
            kind,
            body: json!({
                "apiVersion": kind.api_version(),
                "kind": kind.kind(),
                "metadata": { "name": name, "namespace": namespace },
                "spec": { "serverConfig": server_config },
            }),
            key: ObjectKey::namespaced(namespace, name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_key_display() {
        assert_eq!(
            ObjectKey::namespaced("deploy-reaper-test", "reaper-test").to_string(),
            "deploy-reaper-test/reaper-test"
        );
        assert_eq!(ObjectKey::cluster_scoped("deploy-reaper-test").to_string(), "deploy-reaper-test");
    }

    #[test]
    fn test_namespace_descriptor() {
        let spec = NamespaceDescriptor::new("deploy-reaper-test").build().unwrap();
        assert_eq!(spec.kind(), ObjectKind::Namespace);
        assert_eq!(spec.key(), &ObjectKey::cluster_scoped("deploy-reaper-test"));
        assert_eq!(spec.body()["metadata"]["name"], "deploy-reaper-test");
        assert_eq!(spec.body()["apiVersion"], "v1");
    }

    #[test]
    fn test_namespace_descriptor_blank_name() {
        let err = NamespaceDescriptor::new("  ").build().unwrap_err();
        assert_eq!(
            err,
            DescriptorError::MissingField {
                kind: "Namespace",
                field: "name"
            }
        );
    }

    #[test]
    fn test_reaper_descriptor_cassandra_backend() {
        let spec = ReaperDescriptor::builder()
            .namespace("deploy-reaper-test")
            .name("cass-backend")
            .cluster_name("reaper-test")
            .cassandra_service("reaper-test-reaper-test-service")
            .build()
            .unwrap();

        assert_eq!(spec.kind(), ObjectKind::Reaper);
        assert_eq!(spec.key(), &ObjectKey::namespaced("deploy-reaper-test", "cass-backend"));
        assert_eq!(
            spec.body()["spec"],
            json!({
                "serverConfig": {
                    "storageType": "cassandra",
                    "cassandraBackend": {
                        "clusterName": "reaper-test",
                        "cassandraService": "reaper-test-reaper-test-service",
                    }
                }
            })
        );
    }

    #[test]
    fn test_reaper_descriptor_credentials_secret() {
        let spec = ReaperDescriptor::builder()
            .namespace("ns")
            .name("cass-backend")
            .cluster_name("c")
            .cassandra_service("svc")
            .credentials_secret("reaper-cql")
            .build()
            .unwrap();

        assert_eq!(
            spec.body()["spec"]["serverConfig"]["cassandraBackend"]["cassandraUserSecretName"],
            "reaper-cql"
        );
    }

    #[test]
    fn test_reaper_descriptor_missing_cluster_name() {
        let err = ReaperDescriptor::builder()
            .namespace("ns")
            .name("cass-backend")
            .cassandra_service("svc")
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            DescriptorError::MissingField {
                kind: "Reaper",
                field: "cluster_name"
            }
        );
    }

    #[test]
    fn test_reaper_descriptor_missing_namespace() {
        let err = ReaperDescriptor::builder().name("cass-backend").build().unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::MissingField { field: "namespace", .. }
        ));
    }

    #[test]
    fn test_reaper_descriptor_memory_storage() {
        let spec = ReaperDescriptor::builder()
            .namespace("ns")
            .name("in-memory")
            .storage_type(StorageType::Memory)
            .build()
            .unwrap();

        assert_eq!(spec.body()["spec"], json!({ "serverConfig": { "storageType": "memory" } }));
    }

    #[test]
    fn test_reaper_descriptor_memory_with_backend_rejected() {
        let err = ReaperDescriptor::builder()
            .namespace("ns")
            .name("in-memory")
            .storage_type(StorageType::Memory)
            .cluster_name("c")
            .build()
            .unwrap_err();

        assert!(matches!(err, DescriptorError::Inconsistent { kind: "Reaper", .. }));
    }
}
