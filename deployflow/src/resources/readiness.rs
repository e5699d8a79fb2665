//! Readiness predicates for the fetched object kinds.

use super::status::{CassandraDatacenterView, ReaperView};
use k8s_openapi::api::apps::v1::Deployment;

/// A deployment is ready once every desired replica is ready.
///
/// The API server defaults `spec.replicas` to 1. A deployment scaled to zero
/// is never considered ready.
#[must_use]
pub fn deployment_ready(deploy: &Deployment) -> bool {
    let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = deploy.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
    desired > 0 && ready == desired
}

/// A datacenter is ready once cass-operator reports progress `Ready`.
///
/// If a `Ready` condition is present it must also be `True`.
#[must_use]
pub fn datacenter_ready(dc: &CassandraDatacenterView) -> bool {
    let progress_ready = dc.status.cassandra_operator_progress.as_deref() == Some("Ready");
    progress_ready && dc.condition("Ready").map_or(true, |c| c.is_true())
}

/// A Reaper is ready once its status says so.
#[must_use]
pub fn reaper_ready(reaper: &ReaperView) -> bool {
    reaper.status.ready
}
