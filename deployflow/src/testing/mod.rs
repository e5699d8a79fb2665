//! Test doubles for the orchestrator's collaborators.
//!
//! - [`ScriptedStore`]: in-memory object store with per-object response scripts
//! - [`ScriptedAction`]: stage action replaying scripted results
//! - [`RecordingRegistrar`]: verification client that records calls

mod mocks;
mod store;

pub use mocks::{RecordingRegistrar, ScriptedAction};
pub use store::ScriptedStore;
