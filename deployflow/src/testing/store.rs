//! In-memory object store with scripted responses.

use crate::errors::StoreError;
use crate::resources::{ObjectKey, ObjectKind, ResourceSpec};
use crate::store::ObjectStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

type Key = (ObjectKind, ObjectKey);

/// Pops the next scripted response. The last one repeats forever.
fn next<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

/// An [`ObjectStore`] driven entirely by scripts.
///
/// `get` returns scripted responses per object, then objects created through
/// the store, then `NotFound`. `create` and `apply_manifests` succeed unless
/// scripted otherwise. Every call is counted.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    gets: Mutex<HashMap<Key, VecDeque<Result<Value, StoreError>>>>,
    get_calls: Mutex<HashMap<Key, usize>>,
    get_latency: Mutex<Option<Duration>>,
    created: Mutex<Vec<ResourceSpec>>,
    create_script: Mutex<VecDeque<Result<(), StoreError>>>,
    applied: Mutex<Vec<(String, String)>>,
    apply_script: Mutex<VecDeque<Result<(), StoreError>>>,
}

impl ScriptedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the responses to `get` for one object.
    pub fn script_get(&self, kind: ObjectKind, key: &ObjectKey, responses: Vec<Result<Value, StoreError>>) {
        self.gets.lock().insert((kind, key.clone()), responses.into());
    }

    /// Scripts the responses to `create`.
    pub fn script_create(&self, responses: Vec<Result<(), StoreError>>) {
        *self.create_script.lock() = responses.into();
    }

    /// Scripts the responses to `apply_manifests`.
    pub fn script_apply(&self, responses: Vec<Result<(), StoreError>>) {
        *self.apply_script.lock() = responses.into();
    }

    /// Makes every `get` take `latency` before answering.
    pub fn set_get_latency(&self, latency: Duration) {
        *self.get_latency.lock() = Some(latency);
    }

    /// Number of `get` calls for one object.
    #[must_use]
    pub fn get_calls(&self, kind: ObjectKind, key: &ObjectKey) -> usize {
        self.get_calls
            .lock()
            .get(&(kind, key.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Objects passed to `create`, in order, including failed attempts.
    #[must_use]
    pub fn created(&self) -> Vec<ResourceSpec> {
        self.created.lock().clone()
    }

    /// `(namespace, manifest_set)` pairs passed to `apply_manifests`.
    #[must_use]
    pub fn applied(&self) -> Vec<(String, String)> {
        self.applied.lock().clone()
    }

    /// Number of `apply_manifests` calls.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.applied.lock().len()
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn get(&self, kind: ObjectKind, key: &ObjectKey) -> Result<Value, StoreError> {
        let slot = (kind, key.clone());
        *self.get_calls.lock().entry(slot.clone()).or_insert(0) += 1;

        let latency = *self.get_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(response) = self.gets.lock().get_mut(&slot).and_then(next) {
            return response;
        }

        self.created
            .lock()
            .iter()
            .rev()
            .find(|spec| spec.kind() == kind && spec.key() == key)
            .map(|spec| spec.body().clone())
            .ok_or_else(|| StoreError::not_found(kind.kind(), key.to_string()))
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<(), StoreError> {
        self.created.lock().push(spec.clone());
        next(&mut self.create_script.lock()).unwrap_or(Ok(()))
    }

    async fn apply_manifests(&self, namespace: &str, manifest_set: &str) -> Result<(), StoreError> {
        self.applied
            .lock()
            .push((namespace.to_string(), manifest_set.to_string()));
        next(&mut self.apply_script.lock()).unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::NamespaceDescriptor;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_get_repeats_last() {
        let store = ScriptedStore::new();
        let key = ObjectKey::namespaced("ns", "reaper-test");
        store.script_get(
            ObjectKind::CassandraDatacenter,
            &key,
            vec![Err(StoreError::not_found("CassandraDatacenter", "ns/reaper-test")), Ok(json!({ "n": 1 }))],
        );

        assert!(store.get(ObjectKind::CassandraDatacenter, &key).await.is_err());
        assert_eq!(store.get(ObjectKind::CassandraDatacenter, &key).await, Ok(json!({ "n": 1 })));
        assert_eq!(store.get(ObjectKind::CassandraDatacenter, &key).await, Ok(json!({ "n": 1 })));
        assert_eq!(store.get_calls(ObjectKind::CassandraDatacenter, &key), 3);
    }

    #[tokio::test]
    async fn test_created_objects_are_visible() {
        let store = ScriptedStore::new();
        let spec = NamespaceDescriptor::new("ns").build().unwrap();
        store.create(&spec).await.unwrap();

        let fetched = store.get(ObjectKind::Namespace, spec.key()).await.unwrap();
        assert_eq!(fetched["metadata"]["name"], "ns");
        assert_eq!(store.created().len(), 1);
    }

    #[tokio::test]
    async fn test_unscripted_get_is_not_found() {
        let store = ScriptedStore::new();
        let err = store
            .get(ObjectKind::Reaper, &ObjectKey::namespaced("ns", "cass-backend"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_scripted_apply() {
        let store = ScriptedStore::new();
        store.script_apply(vec![Err(StoreError::Unavailable("webhook".into())), Ok(())]);

        assert!(store.apply_manifests("ns", "deploy_reaper_test").await.is_err());
        assert!(store.apply_manifests("ns", "deploy_reaper_test").await.is_ok());
        assert_eq!(store.apply_calls(), 2);
        assert_eq!(store.applied()[0], ("ns".to_string(), "deploy_reaper_test".to_string()));
    }
}
