//! Per-run context.

use super::DiscoveredValues;
use crate::cancellation::{CancellationToken, Interrupt};
use crate::resources::ObjectKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Names of the objects a Reaper deployment run works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Naming {
    /// Kustomize directory applied to install both operators.
    pub manifest_set: String,
    /// cass-operator deployment.
    pub cass_operator: String,
    /// reaper-operator deployment.
    pub reaper_operator: String,
    /// `CassandraDatacenter` created by the manifests.
    pub datacenter: String,
    /// `Reaper` created by the run.
    pub reaper: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            manifest_set: "deploy_reaper_test".to_string(),
            cass_operator: "cass-operator".to_string(),
            reaper_operator: "reaper-operator".to_string(),
            datacenter: "reaper-test".to_string(),
            reaper: "cass-backend".to_string(),
        }
    }
}

/// Everything one run carries from stage to stage.
///
/// Actions receive it by shared reference. The only mutable part is the
/// write-once [`DiscoveredValues`] bag.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    namespace: String,
    naming: Naming,
    values: DiscoveredValues,
    cancel: Arc<CancellationToken>,
    deadline: Option<Instant>,
}

impl RunContext {
    /// Creates a context targeting `namespace` with default naming.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            namespace: namespace.into(),
            naming: Naming::default(),
            values: DiscoveredValues::new(),
            cancel: Arc::new(CancellationToken::new()),
            deadline: None,
        }
    }

    /// Sets the object names.
    #[must_use]
    pub fn with_naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    /// Shares an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Caps the whole run at `budget` from now.
    #[must_use]
    pub fn with_deadline(self, budget: Duration) -> Self {
        self.with_deadline_at(Instant::now() + budget)
    }

    /// Caps the whole run at an absolute instant.
    #[must_use]
    pub const fn with_deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the run ID.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the context was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the target namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the object names.
    #[must_use]
    pub const fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Returns the discovered values.
    #[must_use]
    pub const fn values(&self) -> &DiscoveredValues {
        &self.values
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns the run deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the run deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns the token and deadline as an [`Interrupt`].
    #[must_use]
    pub fn interrupt(&self) -> Interrupt<'_> {
        Interrupt::new(&self.cancel, self.deadline)
    }

    /// Key of an object named `name` in the run's namespace.
    #[must_use]
    pub fn key(&self, name: impl Into<String>) -> ObjectKey {
        ObjectKey::namespaced(self.namespace.clone(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_defaults() {
        let naming = Naming::default();
        assert_eq!(naming.manifest_set, "deploy_reaper_test");
        assert_eq!(naming.datacenter, "reaper-test");
        assert_eq!(naming.reaper, "cass-backend");
    }

    #[test]
    fn test_context_key_uses_namespace() {
        let ctx = RunContext::new("deploy-reaper-test");
        assert_eq!(
            ctx.key("reaper-test"),
            ObjectKey::namespaced("deploy-reaper-test", "reaper-test")
        );
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = RunContext::new("ns-a");
        let b = RunContext::new("ns-b");
        a.values().set("cluster_name", "a").unwrap();

        assert_ne!(a.run_id(), b.run_id());
        assert!(b.values().is_empty());
    }

    #[test]
    fn test_shared_cancellation() {
        let token = Arc::new(CancellationToken::new());
        let ctx = RunContext::new("ns").with_cancellation(token.clone());

        assert!(ctx.interrupt().check().is_none());
        token.cancel("ctrl-c");
        assert_eq!(ctx.interrupt().check().as_deref(), Some("ctrl-c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ctx = RunContext::new("ns").with_deadline(Duration::from_secs(30));
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert!(ctx.interrupt().check().is_some());
    }
}
