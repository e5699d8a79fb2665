//! Staged provisioning: stages, retry and the sequencer that runs them.

mod builder;
pub mod retry;
mod sequencer;
mod stage;


pub use builder::SequencerBuilder;
pub use retry::{
    run_with_retry, should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision,
    RetryFailure, RetryOutcome, RetryPolicy,
};
pub use sequencer::{RunReport, SequencerState, StageRecord, StageSequencer, StageStatus};
pub use stage::{NoOpAction, ObjectReadiness, ReadinessCheck, ReadinessOutcome, Stage, StageAction};
