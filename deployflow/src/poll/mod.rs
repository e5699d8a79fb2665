//! Waiting for eventually-consistent objects to become ready.
//!
//! This module provides:
//! - [`Condition`] predicates with `and`/`or`/`not` combinators
//! - [`poll_until`], a fixed-cadence poller with a timeout and cancellation
//! - [`PollOutcome`], the single terminal result of a poll

mod condition;
mod poller;

pub use condition::{And, Condition, Not, Or};
pub use poller::{poll_until, Observation, PollConfig, PollOutcome, PollResult};
