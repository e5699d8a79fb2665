//! Run context and discovered values.

mod bag;
mod run;

pub use bag::DiscoveredValues;
pub use run::{Naming, RunContext};
