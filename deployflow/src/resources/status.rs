//! Typed views over the custom resources the harness waits on.
//!
//! Built-in kinds use the `k8s-openapi` types. For the operators' custom
//! resources only the fields the harness reads are modelled. Unknown fields
//! are ignored and missing ones fall back to their defaults, so a freshly
//! created object with no status yet still decodes.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9-]").expect("constant regex pattern is valid"));

/// Strips characters Kubernetes rejects in object names and lowercases the rest.
#[must_use]
pub fn clean_for_kubernetes(input: &str) -> String {
    INVALID_NAME_CHARS.replace_all(input, "").to_lowercase()
}

/// A status condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusCondition {
    /// Condition type, e.g. `Ready`.
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`.
    pub status: String,
    /// Human-readable detail.
    pub message: Option<String>,
}

impl StatusCondition {
    /// Returns true if the condition status is `True`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// A `CassandraDatacenter`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CassandraDatacenterView {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: CassandraDatacenterSpec,
    /// Observed state.
    pub status: CassandraDatacenterStatus,
}

/// Desired state of a `CassandraDatacenter`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CassandraDatacenterSpec {
    /// The Cassandra cluster this datacenter belongs to.
    pub cluster_name: String,
    /// Number of nodes.
    pub size: i32,
}

/// Observed state of a `CassandraDatacenter`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CassandraDatacenterStatus {
    /// `Updating` or `Ready`.
    pub cassandra_operator_progress: Option<String>,
    /// Status conditions.
    pub conditions: Vec<StatusCondition>,
}

impl CassandraDatacenterView {
    /// Name of the service fronting every node of the datacenter.
    #[must_use]
    pub fn service_name(&self) -> String {
        format!(
            "{}-{}-service",
            clean_for_kubernetes(&self.spec.cluster_name),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }

    /// Returns the condition of the given type, if present.
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&StatusCondition> {
        self.status.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// A `Reaper`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReaperView {
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Observed state.
    pub status: ReaperStatus,
}

/// Observed state of a `Reaper`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaperStatus {
    /// Set once the Reaper deployment is serving.
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_clean_for_kubernetes() {
        assert_eq!(clean_for_kubernetes("reaper-test"), "reaper-test");
        assert_eq!(clean_for_kubernetes("Test Cluster_1"), "testcluster1");
        assert_eq!(clean_for_kubernetes("a.b/c"), "abc");
    }

    #[test]
    fn test_datacenter_service_name() {
        let dc: CassandraDatacenterView = serde_json::from_value(json!({
            "metadata": { "name": "reaper-test", "namespace": "deploy-reaper-test" },
            "spec": { "clusterName": "Reaper Test", "size": 3 },
        }))
        .unwrap();

        assert_eq!(dc.service_name(), "reapertest-reaper-test-service");
        assert_eq!(dc.status, CassandraDatacenterStatus::default());
    }

    #[test]
    fn test_reaper_view() {
        let reaper: ReaperView = serde_json::from_value(json!({
            "metadata": { "name": "cass-backend" },
            "status": { "ready": true },
        }))
        .unwrap();
        assert!(reaper.status.ready);
    }
}
