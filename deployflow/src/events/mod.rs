//! Lifecycle events emitted by the sequencer.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A stage is about to run its action.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage's action succeeded and its readiness check, if any, was satisfied.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage failed; the run stops here.
pub const STAGE_FAILED: &str = "stage.failed";
/// Every stage completed.
pub const RUN_SUCCEEDED: &str = "run.succeeded";
/// The run ended at a failed stage.
pub const RUN_FAILED: &str = "run.failed";
