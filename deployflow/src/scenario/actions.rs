//! Mutating actions of the Reaper deployment.

use super::{CASSANDRA_SERVICE, CLUSTER_NAME};
use crate::context::RunContext;
use crate::errors::{DeployflowError, StoreError};
use crate::pipeline::StageAction;
use crate::resources::{NamespaceDescriptor, ReaperDescriptor, StorageType};
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Creates the run's namespace. An existing namespace is reused.
#[derive(Clone)]
pub struct CreateNamespace {
    store: Arc<dyn ObjectStore>,
}

impl CreateNamespace {
    /// Creates the action.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for CreateNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateNamespace").finish_non_exhaustive()
    }
}

#[async_trait]
impl StageAction for CreateNamespace {
    async fn run(&self, ctx: &RunContext) -> Result<(), DeployflowError> {
        let spec = NamespaceDescriptor::new(ctx.namespace()).build()?;
        match self.store.create(&spec).await {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists { .. }) => {
                info!(namespace = %ctx.namespace(), "Namespace already exists, reusing it");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Applies the run's manifest set into its namespace.
#[derive(Clone)]
pub struct ApplyManifests {
    store: Arc<dyn ObjectStore>,
}

impl ApplyManifests {
    /// Creates the action.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ApplyManifests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyManifests").finish_non_exhaustive()
    }
}

#[async_trait]
impl StageAction for ApplyManifests {
    async fn run(&self, ctx: &RunContext) -> Result<(), DeployflowError> {
        self.store
            .apply_manifests(ctx.namespace(), &ctx.naming().manifest_set)
            .await?;
        Ok(())
    }
}

/// Creates the `Reaper` pointing at the datacenter found earlier in the run.
///
/// Reads [`CLUSTER_NAME`] and [`CASSANDRA_SERVICE`] from the discovered
/// values. If either is missing the descriptor build fails.
#[derive(Clone)]
pub struct CreateReaper {
    store: Arc<dyn ObjectStore>,
    storage_type: StorageType,
    credentials_secret: Option<String>,
}

impl CreateReaper {
    /// Creates the action with Cassandra storage.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            storage_type: StorageType::Cassandra,
            credentials_secret: None,
        }
    }

    /// Sets the storage backend.
    #[must_use]
    pub const fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    /// Sets the Cassandra credentials secret.
    #[must_use]
    pub fn with_credentials_secret(mut self, secret: Option<String>) -> Self {
        self.credentials_secret = secret;
        self
    }
}

impl fmt::Debug for CreateReaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateReaper")
            .field("storage_type", &self.storage_type)
            .field("credentials_secret", &self.credentials_secret)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StageAction for CreateReaper {
    async fn run(&self, ctx: &RunContext) -> Result<(), DeployflowError> {
        let mut builder = ReaperDescriptor::builder()
            .namespace(ctx.namespace())
            .name(&ctx.naming().reaper)
            .storage_type(self.storage_type);

        if self.storage_type == StorageType::Cassandra {
            let values = ctx.values();
            if let Some(cluster_name) = values.get_str(CLUSTER_NAME) {
                builder = builder.cluster_name(cluster_name);
            }
            if let Some(service) = values.get_str(CASSANDRA_SERVICE) {
                builder = builder.cassandra_service(service);
            }
            if let Some(secret) = &self.credentials_secret {
                builder = builder.credentials_secret(secret);
            }
        }

        let spec = builder.build()?;
        info!(reaper = %spec.key(), storage = %self.storage_type, "Creating Reaper");
        self.store.create(&spec).await?;
        Ok(())
    }
}
