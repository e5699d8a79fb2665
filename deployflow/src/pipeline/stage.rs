//! Stages: an action followed by an optional readiness check.

use super::retry::RetryPolicy;
use crate::context::{DiscoveredValues, RunContext};
use crate::errors::{DeployflowError, ErrorClass, StageFailure, StoreError, ValidationError};
use crate::poll::{poll_until, Condition, Observation, PollConfig, PollOutcome};
use crate::resources::ObjectKind;
use crate::store::{get_as, ObjectStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

const MAX_OBSERVATION_LEN: usize = 512;

/// The mutating half of a stage.
///
/// Actions only read the context. Anything a later stage needs is captured
/// by a readiness check instead.
#[async_trait]
pub trait StageAction: Send + Sync + fmt::Debug {
    /// Performs the action once.
    async fn run(&self, ctx: &RunContext) -> Result<(), DeployflowError>;
}

/// An action that does nothing, for stages that only wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAction;

#[async_trait]
impl StageAction for NoOpAction {
    async fn run(&self, _ctx: &RunContext) -> Result<(), DeployflowError> {
        Ok(())
    }
}

/// Result of a readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessOutcome {
    /// Number of fetches issued.
    pub polls: usize,
    /// Time spent waiting.
    pub elapsed: Duration,
    /// `Ok` once the condition held and any capture succeeded.
    pub result: Result<(), StageFailure>,
}

/// Waits until something the stage created is ready.
#[async_trait]
pub trait ReadinessCheck: Send + Sync + fmt::Debug {
    /// Short description of what is being waited on, for logs.
    fn describe(&self, ctx: &RunContext) -> String;

    /// Polls until ready, timed out, failed or cancelled.
    async fn await_ready(&self, ctx: &RunContext, config: PollConfig) -> ReadinessOutcome;
}

type NameResolver = Arc<dyn Fn(&RunContext) -> String + Send + Sync>;
type Capture<T> = Arc<dyn Fn(&T, &DiscoveredValues) -> Result<(), DeployflowError> + Send + Sync>;
type Classifier = fn(&StoreError) -> ErrorClass;

/// Polls one object in the run's namespace until a condition holds.
///
/// The object is decoded into `T` before the condition sees it. On success an
/// optional capture hook may record values for later stages.
pub struct ObjectReadiness<T> {
    store: Arc<dyn ObjectStore>,
    kind: ObjectKind,
    name: NameResolver,
    condition: Arc<dyn Condition<T> + Send + Sync>,
    capture: Option<Capture<T>>,
    classify: Classifier,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObjectReadiness<T>
where
    T: DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    /// Waits on the object called `name`.
    pub fn new<C>(store: Arc<dyn ObjectStore>, kind: ObjectKind, name: impl Into<String>, condition: C) -> Self
    where
        C: Condition<T> + Send + Sync + 'static,
    {
        let name = name.into();
        Self::resolving(store, kind, move |_| name.clone(), condition)
    }

    /// Waits on an object whose name is read from the context at run time.
    pub fn resolving<N, C>(store: Arc<dyn ObjectStore>, kind: ObjectKind, name: N, condition: C) -> Self
    where
        N: Fn(&RunContext) -> String + Send + Sync + 'static,
        C: Condition<T> + Send + Sync + 'static,
    {
        Self {
            store,
            kind,
            name: Arc::new(name),
            condition: Arc::new(condition),
            capture: None,
            classify: StoreError::class,
            _marker: PhantomData,
        }
    }

    /// Records values from the ready object.
    #[must_use]
    pub fn with_capture<F>(mut self, capture: F) -> Self
    where
        F: Fn(&T, &DiscoveredValues) -> Result<(), DeployflowError> + Send + Sync + 'static,
    {
        self.capture = Some(Arc::new(capture));
        self
    }

    /// Overrides which fetch errors are polled through.
    #[must_use]
    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }
}

impl<T> fmt::Debug for ObjectReadiness<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReadiness")
            .field("kind", &self.kind)
            .field("capture", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_OBSERVATION_LEN {
        let mut end = MAX_OBSERVATION_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    text
}

fn describe_observation<T: fmt::Debug>(observation: Observation<T, StoreError>) -> String {
    match observation {
        Observation::Value(value) => truncate(format!("{value:?}")),
        Observation::Error(error) => error.to_string(),
    }
}

#[async_trait]
impl<T> ReadinessCheck for ObjectReadiness<T>
where
    T: DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    fn describe(&self, ctx: &RunContext) -> String {
        format!("{} '{}'", self.kind, ctx.key((self.name.as_ref())(ctx)))
    }

    async fn await_ready(&self, ctx: &RunContext, config: PollConfig) -> ReadinessOutcome {
        let key = ctx.key((self.name.as_ref())(ctx));
        let store: &dyn ObjectStore = self.store.as_ref();
        let kind = self.kind;
        let key_ref = &key;

        let polled = poll_until(
            move || get_as::<T, _>(store, kind, key_ref),
            self.condition.as_ref(),
            config,
            ctx.interrupt(),
            self.classify,
        )
        .await;

        let result = match polled.outcome {
            PollOutcome::Satisfied(value) => match &self.capture {
                Some(capture) => (capture.as_ref())(&value, ctx.values())
                    .map_err(|e| StageFailure::Permanent(e.to_string())),
                None => Ok(()),
            },
            PollOutcome::TimedOut { elapsed, last } => Err(StageFailure::TimedOut {
                waited: elapsed,
                last_observation: last.map(describe_observation),
            }),
            PollOutcome::Failed(error) => Err(StageFailure::Permanent(error.to_string())),
            PollOutcome::Cancelled(reason) => Err(StageFailure::Cancelled(reason)),
        };

        ReadinessOutcome {
            polls: polled.polls,
            elapsed: polled.elapsed,
            result,
        }
    }
}

/// One step of a provisioning run.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Unique name within the sequence.
    pub name: String,
    /// The action run first.
    pub action: Arc<dyn StageAction>,
    /// Retry policy for the action. Without one the action runs once.
    pub retry: Option<RetryPolicy<DeployflowError>>,
    /// Check run after the action succeeds.
    pub readiness: Option<Arc<dyn ReadinessCheck>>,
    /// Cadence and budget for the readiness check.
    pub poll: PollConfig,
}

impl Stage {
    /// Creates a stage that runs `action`.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Arc<dyn StageAction>) -> Self {
        Self {
            name: name.into(),
            action,
            retry: None,
            readiness: None,
            poll: PollConfig::default(),
        }
    }

    /// Creates a stage that only waits for `readiness`.
    #[must_use]
    pub fn wait(name: impl Into<String>, readiness: Arc<dyn ReadinessCheck>, poll: PollConfig) -> Self {
        Self::new(name, Arc::new(NoOpAction))
            .with_readiness(readiness)
            .with_poll(poll)
    }

    /// Sets the action retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy<DeployflowError>) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the readiness check.
    #[must_use]
    pub fn with_readiness(mut self, readiness: Arc<dyn ReadinessCheck>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Sets the readiness poll configuration.
    #[must_use]
    pub const fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Validates the stage.
    ///
    /// # Errors
    ///
    /// Returns an error for a blank name, an invalid poll configuration or a
    /// retry policy with no attempts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("Stage name cannot be empty or whitespace-only"));
        }
        let in_stage = |e: ValidationError| {
            ValidationError::new(format!("Stage '{}': {}", self.name, e.message))
                .with_stages(vec![self.name.clone()])
        };
        self.poll.validate().map_err(in_stage)?;
        if let Some(retry) = &self.retry {
            retry.validate().map_err(in_stage)?;
        }
        Ok(())
    }
}
