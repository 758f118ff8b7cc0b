//! One job: a single room and a single assistant session

pub mod entrypoint;
pub mod state;

pub use entrypoint::{Agent, JobContext, JobOutcome};
pub use state::JobState;
