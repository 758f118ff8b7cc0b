//! Lifecycle states of one job

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a job is in its lifecycle
///
/// ```text
/// Created -> Connecting -> Connected -> SessionStarting -> SessionRunning -> Idling -> Terminated
/// ```
///
/// A job cancelled at any point after it starts connecting goes straight to
/// `Terminated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Connecting,
    Connected,
    SessionStarting,
    SessionRunning,
    Idling,
    Terminated,
}

impl JobState {
    /// Whether moving from `self` to `next` is a legal step
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        if next == Terminated {
            return !matches!(self, Created | Terminated);
        }
        matches!(
            (self, next),
            (Created, Connecting)
                | (Connecting, Connected)
                | (Connected, SessionStarting)
                | (SessionStarting, SessionRunning)
                | (SessionRunning, Idling)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Connecting => "connecting",
            JobState::Connected => "connected",
            JobState::SessionStarting => "session_starting",
            JobState::SessionRunning => "session_running",
            JobState::Idling => "idling",
            JobState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
