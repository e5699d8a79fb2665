//! `kubectl apply -k` for the pre-rendered manifest sets.

use crate::errors::StoreError;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// stderr fragments meaning the API server or a CRD is not serving yet.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "connection refused",
    "unable to connect to the server",
    "i/o timeout",
    "tls handshake timeout",
    "the server is currently unable to handle the request",
    "ensure crds are installed first",
    "failed calling webhook",
];

/// Maps a failed apply's stderr onto a [`StoreError`].
///
/// kubectl does not report structured status codes for kustomize applies, so
/// only connectivity and CRD registration failures are told apart. Anything
/// else is a `Command` failure, which the apply retry policy decides on.
pub(crate) fn classify_apply_failure(stderr: &str) -> StoreError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        StoreError::Unavailable(message)
    } else {
        StoreError::Command(message)
    }
}

/// Applies kustomize directories with the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KustomizeApplier {
    kubectl: PathBuf,
    manifests_dir: PathBuf,
    context: Option<String>,
}

impl KustomizeApplier {
    /// Creates an applier that resolves manifest sets under `manifests_dir`.
    #[must_use]
    pub fn new(manifests_dir: impl Into<PathBuf>) -> Self {
        Self {
            kubectl: PathBuf::from("kubectl"),
            manifests_dir: manifests_dir.into(),
            context: None,
        }
    }

    /// Uses a specific kubectl binary.
    #[must_use]
    pub fn with_binary(mut self, kubectl: impl Into<PathBuf>) -> Self {
        self.kubectl = kubectl.into();
        self
    }

    /// Targets a kubeconfig context other than the current one.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Directory holding one kustomize directory per manifest set.
    #[must_use]
    pub const fn manifests_dir(&self) -> &PathBuf {
        &self.manifests_dir
    }

    fn args(&self, namespace: &str, dir: PathBuf) -> Vec<OsString> {
        let mut args = Vec::with_capacity(7);
        if let Some(context) = &self.context {
            args.push(OsString::from("--context"));
            args.push(OsString::from(context));
        }
        args.extend([
            OsString::from("apply"),
            OsString::from("-n"),
            OsString::from(namespace),
            OsString::from("-k"),
            dir.into_os_string(),
        ]);
        args
    }

    /// Applies `<manifests_dir>/<manifest_set>` into `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the set does not exist or kubectl is missing,
    /// otherwise the classified apply failure.
    pub async fn apply(&self, namespace: &str, manifest_set: &str) -> Result<(), StoreError> {
        let dir = self.manifests_dir.join(manifest_set);
        if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(StoreError::Rejected(format!(
                "manifest set '{}' does not exist",
                dir.display()
            )));
        }

        let args = self.args(namespace, dir);
        debug!(kubectl = %self.kubectl.display(), args = ?args, "Applying manifest set");

        let output = Command::new(&self.kubectl)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StoreError::Rejected(format!("kubectl binary '{}' not found", self.kubectl.display()))
                } else {
                    StoreError::Command(format!("failed to run kubectl: {e}"))
                }
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(classify_apply_failure(&String::from_utf8_lossy(&output.stderr)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_missing_crd_is_unavailable() {
        let err = classify_apply_failure(
            "error: resource mapping not found for name: \"reaper-test\" namespace: \"\" from \"STDIN\": no matches for kind \"CassandraDatacenter\"\nensure CRDs are installed first",
        );
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_classify_connection_refused() {
        let err = classify_apply_failure(
            "The connection to the server 127.0.0.1:6443 was refused - did you specify the right host or port?\ndial tcp: connection refused",
        );
        assert!(err.class().is_transient());
    }

    #[test]
    fn test_classify_unknown() {
        let err = classify_apply_failure("  something odd happened \n");
        assert_eq!(err, StoreError::Command("something odd happened".to_string()));
    }

    #[test]
    fn test_args_with_context() {
        let applier = KustomizeApplier::new("/tmp/manifests").with_context("kind-e2e");
        let args = applier.args("ns", PathBuf::from("/tmp/manifests/cass"));
        assert_eq!(
            args,
            vec![
                OsString::from("--context"),
                OsString::from("kind-e2e"),
                OsString::from("apply"),
                OsString::from("-n"),
                OsString::from("ns"),
                OsString::from("-k"),
                OsString::from("/tmp/manifests/cass"),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_missing_manifest_set() {
        let dir = tempfile::tempdir().unwrap();
        let applier = KustomizeApplier::new(dir.path());

        let err = applier.apply("deploy-reaper-test", "does_not_exist").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("cass")).unwrap();
        let applier = KustomizeApplier::new(dir.path()).with_binary("/nonexistent/kubectl-for-tests");

        let err = applier.apply("deploy-reaper-test", "cass").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }
}
