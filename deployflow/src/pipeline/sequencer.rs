//! Strictly ordered stage execution.

use super::retry::{run_with_retry, RetryFailure};
use super::stage::Stage;
use crate::context::RunContext;
use crate::errors::{DeployflowError, StageFailure};
use crate::events::{self, EventSink};
use crate::poll::PollConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerState {
    /// Not started.
    Pending,
    /// Executing the stage at this index.
    Running(usize),
    /// Every stage completed.
    Succeeded,
    /// The stage at `index` failed; later stages were not run.
    Failed {
        /// Index of the failing stage.
        index: usize,
        /// Name of the failing stage.
        stage: String,
        /// Why it failed.
        cause: StageFailure,
    },
}

impl SequencerState {
    /// Returns true for `Succeeded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running(0)) => true,
            (Self::Running(i), Self::Running(j)) => *j == i + 1,
            (Self::Running(_), Self::Succeeded) => true,
            (Self::Running(i), Self::Failed { index, .. }) => index == i,
            _ => false,
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(i) => write!(f, "running({i})"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { index, stage, cause } => {
                write!(f, "failed at stage {index} '{stage}': {cause}")
            }
        }
    }
}

/// Outcome of one executed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Action and readiness check both succeeded.
    Succeeded,
    /// The stage failed.
    Failed,
    /// The run was cancelled during or before the stage.
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Diagnostics for one executed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Position in the sequence.
    pub index: usize,
    /// Outcome.
    pub status: StageStatus,
    /// Action invocations.
    pub attempts: usize,
    /// Readiness fetches.
    pub polls: usize,
    /// Wall-clock time spent in the stage.
    pub duration: Duration,
    /// Failure cause, if the stage did not succeed.
    pub failure: Option<StageFailure>,
}

/// Everything a caller needs to report a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run ID from the context.
    pub run_id: uuid::Uuid,
    /// Target namespace.
    pub namespace: String,
    /// Terminal state.
    pub state: SequencerState,
    /// One record per executed stage, in order.
    pub stages: Vec<StageRecord>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
    /// Total duration.
    pub duration: Duration,
}

impl RunReport {
    /// Returns true if every stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == SequencerState::Succeeded
    }

    /// Returns the failing stage index, name and cause.
    #[must_use]
    pub fn failure(&self) -> Option<(usize, &str, &StageFailure)> {
        match &self.state {
            SequencerState::Failed { index, stage, cause } => Some((*index, stage.as_str(), cause)),
            _ => None,
        }
    }

    /// Returns the record for a stage, if it ran.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.name == name)
    }

    /// Names of stages that ran, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<&str> {
        self.stages.iter().map(|r| r.name.as_str()).collect()
    }

    /// One line per stage, for terminal output.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.stages.len() + 1);
        for record in &self.stages {
            let mut line = format!(
                "  [{}] {} ({} attempt(s), {} poll(s), {:.1}s)",
                record.status,
                record.name,
                record.attempts,
                record.polls,
                record.duration.as_secs_f64()
            );
            if let Some(failure) = &record.failure {
                line.push_str(&format!(": {failure}"));
            }
            lines.push(line);
        }
        lines.push(format!("run {} in {:.1}s", self.state, self.duration.as_secs_f64()));
        lines.join("\n")
    }
}

/// Runs stages in order, stopping at the first failure.
pub struct StageSequencer {
    pub(super) name: String,
    pub(super) stages: Vec<Stage>,
    pub(super) sink: Arc<dyn EventSink>,
}

impl fmt::Debug for StageSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSequencer")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// How one stage ended, before it is folded into the report.
struct StageRun {
    attempts: usize,
    polls: usize,
    result: Result<(), StageFailure>,
}

impl StageSequencer {
    /// Returns the sequence name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names, in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage against `ctx`.
    ///
    /// Always returns a report. The run fails at the first stage whose action
    /// errors beyond its retry budget, whose readiness check does not succeed,
    /// or that is reached after cancellation or the run deadline.
    pub async fn run(&self, ctx: &RunContext) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = SequencerState::Pending;
        let mut records = Vec::with_capacity(self.stages.len());

        info!(
            sequence = %self.name,
            run_id = %ctx.run_id(),
            namespace = %ctx.namespace(),
            stages = self.stages.len(),
            "Starting run"
        );

        for (index, stage) in self.stages.iter().enumerate() {
            transition(&mut state, SequencerState::Running(index));
            let stage_start = Instant::now();

            let run = match ctx.interrupt().check() {
                Some(reason) => StageRun {
                    attempts: 0,
                    polls: 0,
                    result: Err(StageFailure::Cancelled(reason)),
                },
                None => self.run_stage(index, stage, ctx).await,
            };

            let duration = stage_start.elapsed();
            let status = match &run.result {
                Ok(()) => StageStatus::Succeeded,
                Err(StageFailure::Cancelled(_)) => StageStatus::Cancelled,
                Err(_) => StageStatus::Failed,
            };
            records.push(StageRecord {
                name: stage.name.clone(),
                index,
                status,
                attempts: run.attempts,
                polls: run.polls,
                duration,
                failure: run.result.as_ref().err().cloned(),
            });

            if let Err(cause) = run.result {
                warn!(
                    stage = %stage.name,
                    index,
                    cause = %cause,
                    kind = cause.label(),
                    "Stage failed"
                );
                self.sink
                    .emit(
                        events::STAGE_FAILED,
                        Some(json!({
                            "stage": stage.name,
                            "index": index,
                            "kind": cause.label(),
                            "error": cause.to_string(),
                            "attempts": run.attempts,
                            "polls": run.polls,
                        })),
                    )
                    .await;
                transition(
                    &mut state,
                    SequencerState::Failed {
                        index,
                        stage: stage.name.clone(),
                        cause,
                    },
                );
                break;
            }

            info!(
                stage = %stage.name,
                index,
                attempts = run.attempts,
                polls = run.polls,
                duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                "Stage completed"
            );
            self.sink
                .emit(
                    events::STAGE_COMPLETED,
                    Some(json!({
                        "stage": stage.name,
                        "index": index,
                        "attempts": run.attempts,
                        "polls": run.polls,
                    })),
                )
                .await;
        }

        if matches!(state, SequencerState::Running(_)) {
            transition(&mut state, SequencerState::Succeeded);
        }

        let report = RunReport {
            run_id: ctx.run_id(),
            namespace: ctx.namespace().to_string(),
            state,
            stages: records,
            started_at,
            finished_at: Utc::now(),
            duration: start.elapsed(),
        };

        match report.failure() {
            None => {
                info!(sequence = %self.name, run_id = %report.run_id, "Run succeeded");
                self.sink
                    .emit(
                        events::RUN_SUCCEEDED,
                        Some(json!({ "run_id": report.run_id.to_string(), "stages": report.stages.len() })),
                    )
                    .await;
            }
            Some((index, stage, cause)) => {
                warn!(sequence = %self.name, run_id = %report.run_id, stage = %stage, "Run failed");
                self.sink
                    .emit(
                        events::RUN_FAILED,
                        Some(json!({
                            "run_id": report.run_id.to_string(),
                            "stage": stage,
                            "index": index,
                            "error": cause.to_string(),
                        })),
                    )
                    .await;
            }
        }

        report
    }

    async fn run_stage(&self, index: usize, stage: &Stage, ctx: &RunContext) -> StageRun {
        info!(stage = %stage.name, index, "Stage started");
        self.sink
            .emit(events::STAGE_STARTED, Some(json!({ "stage": stage.name, "index": index })))
            .await;

        let budget_end = Instant::now() + stage.poll.timeout;
        let (attempts, action) = run_action(stage, ctx, budget_end).await;
        if let Err(cause) = action {
            return StageRun {
                attempts,
                polls: 0,
                result: Err(cause),
            };
        }

        let Some(readiness) = &stage.readiness else {
            return StageRun {
                attempts,
                polls: 0,
                result: Ok(()),
            };
        };

        let poll = PollConfig {
            timeout: budget_end.saturating_duration_since(Instant::now()),
            ..stage.poll
        };
        debug!(
            stage = %stage.name,
            target = %readiness.describe(ctx),
            interval_s = poll.interval.as_secs(),
            timeout_s = poll.timeout.as_secs(),
            "Waiting for readiness"
        );
        let outcome = readiness.await_ready(ctx, poll).await;
        StageRun {
            attempts,
            polls: outcome.polls,
            result: outcome.result,
        }
    }
}

fn transition(state: &mut SequencerState, next: SequencerState) {
    debug_assert!(state.can_transition_to(&next), "illegal transition {state} -> {next}");
    debug!(from = %state, to = %next, "Sequencer transition");
    *state = next;
}

fn action_failure(attempts: usize, error: DeployflowError) -> StageFailure {
    match error {
        DeployflowError::Cancelled(reason) => StageFailure::Cancelled(reason),
        error => StageFailure::Action {
            attempts,
            error: error.to_string(),
        },
    }
}

/// Runs a stage's action, through its retry policy if it has one.
///
/// The whole action phase ends at `budget_end`. A hanging attempt is abandoned
/// there and a backoff delay that would cross it is not taken.
async fn run_action(stage: &Stage, ctx: &RunContext, budget_end: Instant) -> (usize, Result<(), StageFailure>) {
    let started = Instant::now();
    let interrupt = ctx.interrupt();
    let timed_out = |last: Option<String>| StageFailure::TimedOut {
        waited: started.elapsed(),
        last_observation: last,
    };

    let Some(policy) = &stage.retry else {
        let result = tokio::select! {
            biased;
            reason = interrupt.triggered() => Err(StageFailure::Cancelled(reason)),
            result = stage.action.run(ctx) => result.map_err(|e| action_failure(1, e)),
            () = tokio::time::sleep_until(budget_end) => {
                warn!(stage = %stage.name, "Action exceeded the stage timeout");
                Err(timed_out(None))
            }
        };
        return (1, result);
    };

    let deadline = ctx.deadline().map_or(budget_end, |run| run.min(budget_end));
    let calls = AtomicUsize::new(0);
    let retried = run_with_retry(policy, Some(deadline), interrupt, || {
        calls.fetch_add(1, Ordering::Relaxed);
        stage.action.run(ctx)
    });
    let outcome = tokio::select! {
        biased;
        outcome = retried => outcome,
        () = tokio::time::sleep_until(budget_end) => {
            warn!(stage = %stage.name, "Action exceeded the stage timeout");
            return (calls.load(Ordering::Relaxed), Err(timed_out(None)));
        }
    };

    let attempts = outcome.attempts;
    let result = outcome.result.map_err(|failure| match failure {
        RetryFailure::Exhausted(e) | RetryFailure::NotRetryable(e) => action_failure(attempts, e),
        RetryFailure::BudgetExceeded(e) => timed_out(Some(e.to_string())),
        RetryFailure::Cancelled { reason, .. } => StageFailure::Cancelled(reason),
    });
    (attempts, result)
}
