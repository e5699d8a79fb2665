//! HTTP client for Reaper's REST API.

use super::BackendRegistrar;
use crate::errors::VerificationError;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

const MAX_ERROR_BODY: usize = 512;

/// Talks to a running Reaper instance.
#[derive(Debug, Clone)]
pub struct ReaperApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ReaperApiClient {
    /// Creates a client for the Reaper API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::InvalidRequest` if the URL cannot be parsed
    /// or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, VerificationError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// See [`ReaperApiClient::new`].
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, VerificationError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| VerificationError::InvalidRequest(format!("invalid Reaper URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(VerificationError::InvalidRequest(format!(
                "Reaper URL '{base_url}' cannot be used as a base"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerificationError::InvalidRequest(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// Builds `PUT {base}/cluster/{cluster}?seedHost={host}`.
    pub(crate) fn cluster_url(&self, cluster_name: &str, seed_host: &str) -> Result<Url, VerificationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| VerificationError::InvalidRequest("Reaper URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("cluster")
            .push(cluster_name);
        url.query_pairs_mut().append_pair("seedHost", seed_host);
        Ok(url)
    }
}

#[async_trait]
impl BackendRegistrar for ReaperApiClient {
    async fn register_backend(&self, cluster_name: &str, seed_host: &str) -> Result<(), VerificationError> {
        let url = self.cluster_url(cluster_name, seed_host)?;
        debug!(url = %url, "Registering cluster with Reaper");

        let response = self
            .client
            .put(url)
            .send()
            .await
            .map_err(|e| VerificationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(cluster = %cluster_name, seed_host = %seed_host, "Cluster registered with Reaper");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), body))
    }
}

fn status_error(status: u16, mut body: String) -> VerificationError {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    VerificationError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_url() {
        let client = ReaperApiClient::new("http://localhost:8080").unwrap();
        let url = client
            .cluster_url("reaper-test", "reaper-test-reaper-test-service")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/cluster/reaper-test?seedHost=reaper-test-reaper-test-service"
        );
    }

    #[test]
    fn test_cluster_url_keeps_base_path() {
        let client = ReaperApiClient::new("http://reaper.local/api/").unwrap();
        let url = client.cluster_url("Test Cluster", "seed").unwrap();
        assert_eq!(url.as_str(), "http://reaper.local/api/cluster/Test%20Cluster?seedHost=seed");
    }

    #[test]
    fn test_invalid_url() {
        let err = ReaperApiClient::new("not a url").unwrap_err();
        assert!(matches!(err, VerificationError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_request_failure_is_transport_error() {
        // reqwest refuses non-HTTP schemes before opening a connection.
        let client = ReaperApiClient::new("ftp://reaper.local/").unwrap();
        let err = client.register_backend("c", "seed").await.unwrap_err();
        assert!(matches!(err, VerificationError::Transport(_)));
        assert!(err.class().is_transient());
    }

    #[test]
    fn test_status_error_truncates_body() {
        let err = status_error(500, "é".repeat(400));
        match err {
            VerificationError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.len() <= MAX_ERROR_BODY);
                assert!(body.chars().all(|c| c == 'é'));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_error_keeps_short_body() {
        assert_eq!(
            status_error(404, "cluster not found".to_string()),
            VerificationError::Status {
                status: 404,
                body: "cluster not found".to_string()
            }
        );
    }
}
