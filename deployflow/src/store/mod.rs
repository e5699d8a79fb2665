//! Access to the cluster's object store.
//!
//! The orchestrator only talks to the cluster through [`ObjectStore`].
//! [`ClusterStore`] implements it with a `kube::Client`, handing manifest sets
//! to [`KustomizeApplier`]. Tests use
//! [`ScriptedStore`](crate::testing::ScriptedStore).

mod cluster;
mod kubectl;

pub use cluster::ClusterStore;
pub use kubectl::KustomizeApplier;

use crate::errors::StoreError;
use crate::resources::{ObjectKey, ObjectKind, ResourceSpec};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Read, create and apply operations against the cluster.
///
/// Implementations report errors as they see them. Whether an error is
/// retried or polled through is decided by the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches an object as raw JSON.
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> Result<Value, StoreError>;

    /// Creates an object.
    async fn create(&self, spec: &ResourceSpec) -> Result<(), StoreError>;

    /// Applies a pre-rendered kustomize manifest set into `namespace`.
    async fn apply_manifests(&self, namespace: &str, manifest_set: &str) -> Result<(), StoreError>;
}

/// Fetches an object and decodes it into a typed view.
///
/// # Errors
///
/// Returns the store's error, or `StoreError::Malformed` if decoding fails.
pub async fn get_as<T, S>(store: &S, kind: ObjectKind, key: &ObjectKey) -> Result<T, StoreError>
where
    T: DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    let value = store.get(kind, key).await?;
    serde_json::from_value(value).map_err(|e| StoreError::Malformed(format!("{kind} '{key}': {e}")))
}
