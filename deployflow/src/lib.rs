//! # Deployflow
//!
//! Readiness polling and staged provisioning for end-to-end deployment tests.
//!
//! A run is a fixed sequence of stages. Each stage performs an action against
//! the cluster, optionally retried, and then waits for something to become
//! ready:
//!
//! - **Condition polling**: fetch an object on a fixed cadence until a
//!   predicate holds, with a hard timeout
//! - **Bounded retry**: retry flaky actions a fixed number of times
//! - **Strict sequencing**: the first failing stage ends the run, and the
//!   report says which stage failed and why
//! - **Cancellation**: a token and an optional run deadline end any wait promptly
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let store = Arc::new(ClusterStore::connect(None, KustomizeApplier::new("manifests")).await?);
//! let ctx = RunContext::new("deploy-reaper-test");
//!
//! let outcome = ReaperScenario::new(store)
//!     .run(&ctx, Arc::new(LoggingEventSink::default()))
//!     .await?;
//! println!("{}", outcome.report.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod poll;
pub mod resources;
pub mod scenario;
pub mod store;
pub mod testing;
pub mod verify;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, Interrupt};
    pub use crate::config::{HarnessConfig, WaitConfig};
    pub use crate::context::{DiscoveredValues, Naming, RunContext};
    pub use crate::errors::{
        DataConflictError, DeployflowError, ErrorClass, StageFailure, StoreError,
        ValidationError, VerificationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{
        ObjectReadiness, ReadinessCheck, RetryConfig, RetryPolicy, RunReport, SequencerBuilder,
        SequencerState, Stage, StageAction, StageSequencer,
    };
    pub use crate::poll::{poll_until, Condition, PollConfig, PollOutcome};
    pub use crate::resources::{ObjectKey, ObjectKind, ReaperDescriptor, StorageType};
    pub use crate::scenario::{ReaperScenario, ScenarioOutcome};
    pub use crate::store::{ClusterStore, KustomizeApplier, ObjectStore};
    pub use crate::verify::BackendRegistrar;
    #[cfg(feature = "http")]
    pub use crate::verify::ReaperApiClient;
    pub use std::sync::Arc;
}
