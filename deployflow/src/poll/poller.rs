//! The condition poller.

use super::Condition;
use crate::cancellation::Interrupt;
use crate::errors::{ErrorClass, ValidationError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cadence and budget for one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between the starts of consecutive fetches.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl PollConfig {
    /// Creates a new poll configuration.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Creates a configuration from whole seconds.
    #[must_use]
    pub const fn from_secs(interval: u64, timeout: u64) -> Self {
        Self::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    /// Checks `timeout > 0`, `interval > 0` and `interval <= timeout`.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing the first violated bound.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout.is_zero() {
            return Err(ValidationError::new("poll timeout must be greater than zero"));
        }
        if self.interval.is_zero() {
            return Err(ValidationError::new("poll interval must be greater than zero"));
        }
        if self.interval > self.timeout {
            return Err(ValidationError::new(format!(
                "poll interval {:?} exceeds timeout {:?}",
                self.interval, self.timeout
            )));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    /// 30s interval, 3 minute timeout.
    fn default() -> Self {
        Self::from_secs(30, 180)
    }
}

/// The last thing a poll saw before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T, E> {
    /// A fetched value that did not satisfy the condition.
    Value(T),
    /// A transient fetch error.
    Error(E),
}

/// Terminal outcome of a poll. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T, E> {
    /// The condition held for this value.
    Satisfied(T),
    /// The timeout elapsed first.
    TimedOut {
        /// Time spent polling.
        elapsed: Duration,
        /// The last value or transient error observed.
        last: Option<Observation<T, E>>,
    },
    /// A fetch failed with a permanent error.
    Failed(E),
    /// The run was cancelled or its deadline passed.
    Cancelled(String),
}

impl<T, E> PollOutcome<T, E> {
    /// Returns true for [`PollOutcome::Satisfied`].
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }

    /// Returns the satisfying value, if any.
    #[must_use]
    pub fn satisfied(self) -> Option<T> {
        match self {
            Self::Satisfied(value) => Some(value),
            _ => None,
        }
    }
}

/// A poll outcome together with how many fetches it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult<T, E> {
    /// The terminal outcome.
    pub outcome: PollOutcome<T, E>,
    /// Number of fetches issued.
    pub polls: usize,
    /// Wall-clock time from the first fetch to the outcome.
    pub elapsed: Duration,
}

/// Repeatedly fetches an object until `condition` holds.
///
/// The first fetch is issued immediately and later fetches start every
/// `config.interval`. Transient fetch errors (per `classify`) count as "not
/// ready yet"; a permanent one ends the poll with [`PollOutcome::Failed`].
/// Once `config.timeout` has elapsed the poll returns
/// [`PollOutcome::TimedOut`], so a condition that never holds returns within
/// `[timeout, timeout + interval)`. A fetch that is still running at the
/// deadline is dropped.
///
/// `interrupt` is raced against every fetch and sleep.
pub async fn poll_until<T, E, F, Fut, C, K>(
    mut fetch: F,
    condition: &C,
    config: PollConfig,
    interrupt: Interrupt<'_>,
    classify: K,
) -> PollResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Condition<T> + ?Sized,
    K: Fn(&E) -> ErrorClass,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut polls: usize = 0;
    let mut last: Option<Observation<T, E>> = None;

    let finish = |outcome: PollOutcome<T, E>, polls: usize| PollResult {
        outcome,
        polls,
        elapsed: start.elapsed(),
    };

    loop {
        if let Some(reason) = interrupt.check() {
            return finish(PollOutcome::Cancelled(reason), polls);
        }

        polls += 1;
        let fetched = tokio::select! {
            biased;
            reason = interrupt.triggered() => {
                return finish(PollOutcome::Cancelled(reason), polls);
            }
            result = fetch() => result,
            () = tokio::time::sleep_until(deadline) => {
                debug!(poll = polls, "Fetch still running at deadline");
                return finish(
                    PollOutcome::TimedOut { elapsed: start.elapsed(), last },
                    polls,
                );
            }
        };

        match fetched {
            Ok(value) => {
                if condition.matches(&value) {
                    debug!(poll = polls, "Condition satisfied");
                    return finish(PollOutcome::Satisfied(value), polls);
                }
                debug!(poll = polls, "Condition not yet satisfied");
                last = Some(Observation::Value(value));
            }
            Err(error) => match classify(&error) {
                ErrorClass::Transient => {
                    debug!(poll = polls, error = %error, "Transient fetch error");
                    last = Some(Observation::Error(error));
                }
                ErrorClass::Permanent => {
                    debug!(poll = polls, error = %error, "Permanent fetch error");
                    return finish(PollOutcome::Failed(error), polls);
                }
            },
        }

        if Instant::now() >= deadline {
            return finish(
                PollOutcome::TimedOut {
                    elapsed: start.elapsed(),
                    last,
                },
                polls,
            );
        }

        let next_tick = u32::try_from(polls)
            .ok()
            .and_then(|n| config.interval.checked_mul(n))
            .map_or(deadline, |offset| start + offset)
            .min(deadline);

        tokio::select! {
            biased;
            reason = interrupt.triggered() => {
                return finish(PollOutcome::Cancelled(reason), polls);
            }
            () = tokio::time::sleep_until(next_tick) => {}
        }
    }
}
