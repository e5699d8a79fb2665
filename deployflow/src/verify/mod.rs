//! Post-deployment verification against the Reaper API.
//!
//! Verification is not a stage. It runs once, after the sequencer reports
//! success, and its failure is reported separately from stage failures.

#[cfg(feature = "http")]
mod reaper_api;

#[cfg(feature = "http")]
pub use reaper_api::ReaperApiClient;

use crate::errors::VerificationError;
use async_trait::async_trait;

/// Registers a Cassandra cluster with a repair service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendRegistrar: Send + Sync {
    /// Registers `cluster_name`, reachable through `seed_host`.
    async fn register_backend(&self, cluster_name: &str, seed_host: &str) -> Result<(), VerificationError>;
}
