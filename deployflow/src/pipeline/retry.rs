//! Bounded retry for flaky stage actions.
//!
//! A [`RetryPolicy`] caps the number of attempts and decides which errors are
//! worth another try. By default attempts follow each other immediately;
//! [`RetryConfig`] can add backoff and jitter, but a delay never runs past the
//! stage's deadline.

use crate::cancellation::Interrupt;
use crate::errors::{DeployflowError, ValidationError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    #[default]
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Attempt budget and delay shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds. Zero retries immediately.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 30_000,
            backoff_strategy: BackoffStrategy::Constant,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Calculates the delay to wait after `failed_attempts` failures.
    #[must_use]
    pub fn delay_after(&self, failed_attempts: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;
        let exponent = u32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(u32::MAX);

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => base
                .saturating_mul(2u64.saturating_pow(exponent))
                .min(max),
            BackoffStrategy::Linear => base
                .saturating_mul(u64::from(exponent).saturating_add(1))
                .min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Attempt budget plus a retryable/non-retryable classifier.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    is_retryable: Classifier<E>,
}

impl<E> RetryPolicy<E> {
    /// Creates a policy that retries every error up to `max_attempts` times.
    #[must_use]
    pub fn always(max_attempts: usize) -> Self {
        Self {
            config: RetryConfig::new().with_max_attempts(max_attempts),
            is_retryable: Arc::new(|_| true),
        }
    }

    /// Replaces the attempt and delay configuration.
    #[must_use]
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the classifier.
    #[must_use]
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(classifier);
        self
    }

    /// Returns the attempt and delay configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }

    /// Returns true if `error` may be retried.
    #[must_use]
    pub fn is_retryable(&self, error: &E) -> bool {
        (self.is_retryable)(error)
    }

    /// Validates the policy configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config.max_attempts < 1 {
            return Err(ValidationError::new("max_attempts must be >= 1"));
        }
        Ok(())
    }
}

impl RetryPolicy<DeployflowError> {
    /// Creates a policy that only retries transient errors.
    #[must_use]
    pub fn transient_only(max_attempts: usize) -> Self {
        Self::always(max_attempts).with_classifier(DeployflowError::is_transient)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            is_retryable: Arc::clone(&self.is_retryable),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Decides what to do after attempt number `attempts` failed with `error`.
#[must_use]
pub fn should_retry<E>(policy: &RetryPolicy<E>, attempts: usize, error: &E) -> RetryDecision {
    if !policy.is_retryable(error) {
        return RetryDecision::NotRetryable;
    }
    if attempts >= policy.max_attempts() {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(policy.config.delay_after(attempts))
}

/// Why a retried operation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure<E> {
    /// Every attempt failed with a retryable error; this is the last one.
    Exhausted(E),
    /// An attempt failed with a non-retryable error.
    NotRetryable(E),
    /// The next backoff delay would have crossed the stage deadline.
    BudgetExceeded(E),
    /// The run was interrupted between or during attempts.
    Cancelled {
        /// Cancellation reason.
        reason: String,
        /// The last error seen before cancellation.
        last: Option<E>,
    },
}

impl<E> RetryFailure<E> {
    /// Returns the last error produced by the operation, if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted(e) | Self::NotRetryable(e) | Self::BudgetExceeded(e) => Some(e),
            Self::Cancelled { last, .. } => last.as_ref(),
        }
    }
}

/// Result of [`run_with_retry`] together with the number of invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T, E> {
    /// How many times the operation was invoked.
    pub attempts: usize,
    /// The final result.
    pub result: Result<T, RetryFailure<E>>,
}

/// Runs `operation` until it succeeds or the policy gives up.
///
/// `deadline` caps backoff: a delay that would end after it is not taken and
/// the last error is returned as [`RetryFailure::BudgetExceeded`].
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy<E>,
    deadline: Option<Instant>,
    interrupt: Interrupt<'_>,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempts = 0;
    let mut last: Option<E> = None;

    loop {
        if let Some(reason) = interrupt.check() {
            return RetryOutcome {
                attempts,
                result: Err(RetryFailure::Cancelled { reason, last }),
            };
        }

        attempts += 1;
        let result = tokio::select! {
            biased;
            reason = interrupt.triggered() => {
                return RetryOutcome {
                    attempts,
                    result: Err(RetryFailure::Cancelled { reason, last }),
                };
            }
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => {
                return RetryOutcome {
                    attempts,
                    result: Ok(value),
                }
            }
            Err(error) => error,
        };

        match should_retry(policy, attempts, &error) {
            RetryDecision::Retry(delay) => {
                if deadline.is_some_and(|d| Instant::now() + delay > d) {
                    warn!(attempt = attempts, error = %error, "Retry delay exceeds stage budget");
                    return RetryOutcome {
                        attempts,
                        result: Err(RetryFailure::BudgetExceeded(error)),
                    };
                }
                debug!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying after error"
                );
                last = Some(error);
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        reason = interrupt.triggered() => {
                            return RetryOutcome {
                                attempts,
                                result: Err(RetryFailure::Cancelled { reason, last }),
                            };
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
            RetryDecision::GiveUp => {
                warn!(attempt = attempts, error = %error, "Retry attempts exhausted");
                return RetryOutcome {
                    attempts,
                    result: Err(RetryFailure::Exhausted(error)),
                };
            }
            RetryDecision::NotRetryable => {
                debug!(attempt = attempts, error = %error, "Error is not retryable");
                return RetryOutcome {
                    attempts,
                    result: Err(RetryFailure::NotRetryable(error)),
                };
            }
        }
    }
}
