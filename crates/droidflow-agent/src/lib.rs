//! Task execution loop.
//!
//! One [`runner::TaskRunner`] drives one goal: capture an observation, ask
//! the model for exactly one action, dispatch it, record the outcome, and
//! repeat. On a `request_human_auth` action the session suspends on the
//! bridge until a human decision (or timeout) comes back, then resumes.
//! Independent sessions are independent runners with no shared mutable
//! step state.

pub mod runner;
pub mod session;
pub mod trace;

pub use runner::{TaskOutcome, TaskRunner};
pub use session::{TaskSession, TaskStatus};
pub use trace::{JsonlTrace, TraceSink};
