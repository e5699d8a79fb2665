//! Cooperative cancellation for provisioning runs.
//!
//! A run holds one [`CancellationToken`] and an optional deadline, bundled as
//! an [`Interrupt`]. Pollers and retry loops race their sleeps against
//! [`Interrupt::triggered`] so an external signal ends an in-flight wait
//! promptly.

mod interrupt;
mod token;

pub use interrupt::{Interrupt, DEADLINE_EXCEEDED};
pub use token::CancellationToken;
