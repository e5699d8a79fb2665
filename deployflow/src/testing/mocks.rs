//! Scripted actions and a recording verification client.

use crate::context::RunContext;
use crate::errors::{DeployflowError, VerificationError};
use crate::pipeline::StageAction;
use crate::verify::BackendRegistrar;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// A stage action that replays scripted results and counts its calls.
///
/// Once the script is down to one result, that result repeats. An empty
/// script always succeeds.
#[derive(Debug, Default)]
pub struct ScriptedAction {
    results: Mutex<VecDeque<Result<(), DeployflowError>>>,
    call_count: Mutex<usize>,
    latency: Option<Duration>,
}

impl ScriptedAction {
    /// Creates an action that always succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Creates an action that returns `results` in order.
    #[must_use]
    pub fn with_results(results: Vec<Result<(), DeployflowError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    /// Creates an action that fails `failures` times, then succeeds.
    #[must_use]
    pub fn failing_times(failures: usize, error: impl Into<DeployflowError>) -> Self {
        let error = error.into();
        let mut results: Vec<_> = (0..failures).map(|_| Err(error.clone())).collect();
        results.push(Ok(()));
        Self::with_results(results)
    }

    /// Makes each call take `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl StageAction for ScriptedAction {
    async fn run(&self, _ctx: &RunContext) -> Result<(), DeployflowError> {
        *self.call_count.lock() += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut results = self.results.lock();
        if results.len() > 1 {
            results.pop_front().unwrap_or(Ok(()))
        } else {
            results.front().cloned().unwrap_or(Ok(()))
        }
    }
}

/// A [`BackendRegistrar`] that records every registration.
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    calls: Mutex<Vec<(String, String)>>,
    result: Mutex<Option<VerificationError>>,
}

impl RecordingRegistrar {
    /// Creates a registrar that accepts every registration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registrar that rejects every registration with `error`.
    #[must_use]
    pub fn failing(error: VerificationError) -> Self {
        Self {
            result: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    /// Returns `(cluster_name, seed_host)` for each call.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BackendRegistrar for RecordingRegistrar {
    async fn register_backend(&self, cluster_name: &str, seed_host: &str) -> Result<(), VerificationError> {
        self.calls
            .lock()
            .push((cluster_name.to_string(), seed_host.to_string()));
        match self.result.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;

    #[tokio::test]
    async fn test_scripted_action_sequence() {
        let ctx = RunContext::new("ns");
        let action = ScriptedAction::failing_times(2, StoreError::Unavailable("webhook".into()));

        assert!(action.run(&ctx).await.is_err());
        assert!(action.run(&ctx).await.is_err());
        assert!(action.run(&ctx).await.is_ok());
        assert!(action.run(&ctx).await.is_ok());
        assert_eq!(action.call_count(), 4);
    }

    #[tokio::test]
    async fn test_recording_registrar() {
        let registrar = RecordingRegistrar::new();
        registrar.register_backend("reaper-test", "svc").await.unwrap();
        assert_eq!(registrar.calls(), vec![("reaper-test".to_string(), "svc".to_string())]);

        let failing = RecordingRegistrar::failing(VerificationError::Transport("refused".into()));
        assert!(failing.register_backend("c", "s").await.is_err());
        assert_eq!(failing.calls().len(), 1);
    }
}
