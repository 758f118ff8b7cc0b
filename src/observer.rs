//! Job observers
//!
//! The entry point reports what it does through an injected [`JobObserver`]
//! instead of reaching for global state. The binary installs a tracing-backed
//! observer; the worker installs one that turns callbacks into events.

use crate::error::SessionError;
use crate::job::JobState;
use crate::room::JobHandle;
use tracing::{debug, info, trace, warn};

/// Result of the scripted greeting
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GreetingOutcome {
    /// The greeting was queued on the session
    Spoken,
    /// The session refused it; the job keeps running
    Failed(SessionError),
    /// The job was cancelled before the greeting was due
    Skipped,
}

/// Receives lifecycle notifications from a running job
pub trait JobObserver: Send + Sync {
    fn on_transition(&self, job: &JobHandle, from: JobState, to: JobState);

    fn on_greeting(&self, job: &JobHandle, outcome: &GreetingOutcome);

    fn on_idle_tick(&self, _job: &JobHandle, _ticks: u64) {}
}

/// Logs job activity through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_transition(&self, job: &JobHandle, from: JobState, to: JobState) {
        info!(job = %job.id, room = %job.room_name, "{} -> {}", from, to);
    }

    fn on_greeting(&self, job: &JobHandle, outcome: &GreetingOutcome) {
        match outcome {
            GreetingOutcome::Spoken => info!(job = %job.id, "Greeting sent"),
            GreetingOutcome::Failed(e) => {
                warn!(job = %job.id, "Greeting failed, continuing without it: {}", e)
            }
            GreetingOutcome::Skipped => debug!(job = %job.id, "Greeting skipped"),
        }
    }

    fn on_idle_tick(&self, job: &JobHandle, ticks: u64) {
        trace!(job = %job.id, ticks, "Idle");
    }
}
