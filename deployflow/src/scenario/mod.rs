//! The Reaper deployment run.
//!
//! Seven stages, in order: create the namespace, apply the operator
//! manifests, wait for both operators, wait for the Cassandra datacenter,
//! create the `Reaper`, wait for it. Once every stage succeeds the discovered
//! cluster is registered with Reaper's API.

mod actions;
mod reaper;

pub use actions::{ApplyManifests, CreateNamespace, CreateReaper};
pub use reaper::{
    ReaperScenario, ScenarioOutcome, APPLY_MANIFESTS, CREATE_NAMESPACE, CREATE_REAPER,
    WAIT_CASS_OPERATOR, WAIT_DATACENTER, WAIT_REAPER, WAIT_REAPER_OPERATOR,
};

/// Discovered value: the datacenter's Cassandra cluster name.
pub const CLUSTER_NAME: &str = "cluster_name";

/// Discovered value: the service fronting the datacenter's nodes.
pub const CASSANDRA_SERVICE: &str = "cassandra_service";
