//! Harness configuration.
//!
//! Every field defaults to the values the Reaper end-to-end run has always
//! used, so an empty JSON object is a valid config. Values are layered: file,
//! then `DEPLOYFLOW_*` environment variables, then CLI flags.

use crate::context::Naming;
use crate::errors::ConfigError;
use crate::pipeline::RetryConfig;
use crate::poll::PollConfig;
use crate::resources::StorageType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `namespace`.
pub const ENV_NAMESPACE: &str = "DEPLOYFLOW_NAMESPACE";
/// Overrides `manifests_dir`.
pub const ENV_MANIFESTS_DIR: &str = "DEPLOYFLOW_MANIFESTS_DIR";
/// Overrides `reaper_url`.
pub const ENV_REAPER_URL: &str = "DEPLOYFLOW_REAPER_URL";
/// Overrides `kubectl`.
pub const ENV_KUBECTL: &str = "DEPLOYFLOW_KUBECTL";

/// Poll cadence for one wait stage, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Seconds between fetches.
    pub interval_seconds: u64,
    /// Seconds before the stage times out.
    pub timeout_seconds: u64,
}

impl WaitConfig {
    /// Creates a wait config.
    #[must_use]
    pub const fn new(interval_seconds: u64, timeout_seconds: u64) -> Self {
        Self {
            interval_seconds,
            timeout_seconds,
        }
    }

    /// Converts to a [`PollConfig`].
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        PollConfig::from_secs(self.interval_seconds, self.timeout_seconds)
    }
}

/// Configuration for a Reaper deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Namespace the run provisions into.
    pub namespace: String,
    /// Directory containing one kustomize directory per manifest set.
    pub manifests_dir: PathBuf,
    /// kubectl binary used to apply manifest sets.
    pub kubectl: PathBuf,
    /// kubeconfig context. The current context is used when unset.
    pub kube_context: Option<String>,
    /// Names of the objects the run creates and waits on.
    pub naming: Naming,
    /// Wait for cass-operator and reaper-operator.
    pub operator_wait: WaitConfig,
    /// Wait for the Cassandra datacenter.
    pub datacenter_wait: WaitConfig,
    /// Wait for the Reaper.
    pub reaper_wait: WaitConfig,
    /// Retry budget for applying the manifests.
    pub apply: RetryConfig,
    /// Only retry the apply on transient errors.
    pub apply_transient_only: bool,
    /// Reaper storage backend.
    pub storage_type: StorageType,
    /// Secret with Cassandra credentials for Reaper.
    pub credentials_secret: Option<String>,
    /// Reaper REST API base URL. Verification is skipped when unset.
    pub reaper_url: Option<String>,
    /// Cap on the whole run.
    pub deadline_seconds: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            namespace: "deploy-reaper-test".to_string(),
            manifests_dir: PathBuf::from("manifests"),
            kubectl: PathBuf::from("kubectl"),
            kube_context: None,
            naming: Naming::default(),
            operator_wait: WaitConfig::new(30, 180),
            datacenter_wait: WaitConfig::new(15, 600),
            reaper_wait: WaitConfig::new(10, 180),
            apply: RetryConfig::default(),
            apply_transient_only: false,
            storage_type: StorageType::Cassandra,
            credentials_secret: None,
            reaper_url: None,
            deadline_seconds: None,
        }
    }
}

impl HarnessConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Loads `path` if given, otherwise the defaults, then applies the
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`HarnessConfig::from_file`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Applies `DEPLOYFLOW_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Applies `DEPLOYFLOW_*` overrides from `lookup`. Blank values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(namespace) = get(ENV_NAMESPACE) {
            self.namespace = namespace;
        }
        if let Some(dir) = get(ENV_MANIFESTS_DIR) {
            self.manifests_dir = PathBuf::from(dir);
        }
        if let Some(url) = get(ENV_REAPER_URL) {
            self.reaper_url = Some(url);
        }
        if let Some(kubectl) = get(ENV_KUBECTL) {
            self.kubectl = PathBuf::from(kubectl);
        }
    }

    /// The run deadline as a duration.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }

    /// Checks names, poll cadences and the retry budget.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::Invalid {
            field: field.to_string(),
            reason,
        };

        if self.namespace.trim().is_empty() {
            return Err(invalid("namespace", "must not be empty".into()));
        }
        let names = [
            ("naming.manifest_set", &self.naming.manifest_set),
            ("naming.cass_operator", &self.naming.cass_operator),
            ("naming.reaper_operator", &self.naming.reaper_operator),
            ("naming.datacenter", &self.naming.datacenter),
            ("naming.reaper", &self.naming.reaper),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty".into()));
            }
        }

        let waits = [
            ("operator_wait", self.operator_wait),
            ("datacenter_wait", self.datacenter_wait),
            ("reaper_wait", self.reaper_wait),
        ];
        for (field, wait) in waits {
            wait.poll_config()
                .validate()
                .map_err(|e| invalid(field, e.message))?;
        }

        if self.apply.max_attempts < 1 {
            return Err(invalid("apply.max_attempts", "must be >= 1".into()));
        }
        if self.deadline_seconds == Some(0) {
            return Err(invalid("deadline_seconds", "must be greater than zero".into()));
        }
        if let Some(url) = &self.reaper_url {
            if url.trim().is_empty() {
                return Err(invalid("reaper_url", "must not be empty when set".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reaper_run() {
        let config = HarnessConfig::default();
        assert_eq!(config.namespace, "deploy-reaper-test");
        assert_eq!(config.naming.manifest_set, "deploy_reaper_test");
        assert_eq!(config.operator_wait.poll_config(), PollConfig::from_secs(30, 180));
        assert_eq!(config.datacenter_wait.poll_config(), PollConfig::from_secs(15, 600));
        assert_eq!(config.reaper_wait.poll_config(), PollConfig::from_secs(10, 180));
        assert_eq!(config.apply.max_attempts, 3);
        assert_eq!(config.apply.base_delay_ms, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "namespace": "reaper-ci",
                "naming": {{ "datacenter": "dc1" }},
                "reaper_wait": {{ "interval_seconds": 5, "timeout_seconds": 60 }},
                "apply": {{ "max_attempts": 5, "base_delay_ms": 2000, "backoff_strategy": "exponential" }},
                "storage_type": "memory"
            }}"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.namespace, "reaper-ci");
        assert_eq!(config.naming.datacenter, "dc1");
        assert_eq!(config.naming.reaper, "cass-backend");
        assert_eq!(config.reaper_wait, WaitConfig::new(5, 60));
        assert_eq!(config.operator_wait, WaitConfig::new(30, 180));
        assert_eq!(config.apply.max_attempts, 5);
        assert_eq!(config.apply.max_delay_ms, 30_000);
        assert_eq!(config.storage_type, StorageType::Memory);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = HarnessConfig::from_file("/nonexistent/deployflow.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let bad = HarnessConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(bad, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_NAMESPACE, "from-env"),
            (ENV_REAPER_URL, "http://localhost:8080"),
            (ENV_KUBECTL, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config.apply_env_from(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.namespace, "from-env");
        assert_eq!(config.reaper_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.kubectl, PathBuf::from("kubectl"));
        assert_eq!(config.manifests_dir, PathBuf::from("manifests"));
    }

    #[test]
    fn test_validation_rejects_bad_wait() {
        let mut config = HarnessConfig::default();
        config.datacenter_wait = WaitConfig::new(700, 600);
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "datacenter_wait"),
            other => panic!("expected invalid datacenter_wait, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_blank_names() {
        let mut config = HarnessConfig::default();
        config.naming.reaper = String::new();
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.namespace = " ".into();
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.deadline_seconds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deadline() {
        let mut config = HarnessConfig::default();
        assert_eq!(config.deadline(), None);
        config.deadline_seconds = Some(1800);
        assert_eq!(config.deadline(), Some(Duration::from_secs(1800)));
    }
}
