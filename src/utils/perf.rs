//! Startup timing for jobs
//!
//! Uses `tokio::time::Instant` so timings follow the runtime clock.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// A stopwatch that records labelled laps
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    last: Instant,
    laps: Vec<(&'static str, Duration)>,
}

impl Stopwatch {
    /// Start a new stopwatch
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            laps: Vec::new(),
        }
    }

    /// Record the time since the previous lap and return it
    pub fn lap(&mut self, label: &'static str) -> Duration {
        let now = Instant::now();
        let lap = now - self.last;
        self.last = now;
        self.laps.push((label, lap));
        lap
    }

    /// Time since the stopwatch started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// All recorded laps
    pub fn laps(&self) -> &[(&'static str, Duration)] {
        &self.laps
    }

    /// Duration of the first lap with this label
    pub fn lap_for(&self, label: &str) -> Option<Duration> {
        self.laps.iter().find(|(l, _)| *l == label).map(|(_, d)| *d)
    }
}

/// How long each startup phase of a job took
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupTimings {
    pub connect_ms: Option<u64>,
    pub assemble_ms: Option<u64>,
    pub session_start_ms: Option<u64>,
    pub greeting_wait_ms: Option<u64>,
}

impl StartupTimings {
    pub const CONNECT: &'static str = "connect";
    pub const ASSEMBLE: &'static str = "assemble";
    pub const SESSION_START: &'static str = "session_start";
    pub const GREETING_WAIT: &'static str = "greeting_wait";

    /// Collect phase durations from a stopwatch's laps
    pub fn from_stopwatch(sw: &Stopwatch) -> Self {
        let ms = |label| sw.lap_for(label).map(|d| d.as_millis() as u64);
        Self {
            connect_ms: ms(Self::CONNECT),
            assemble_ms: ms(Self::ASSEMBLE),
            session_start_ms: ms(Self::SESSION_START),
            greeting_wait_ms: ms(Self::GREETING_WAIT),
        }
    }

    /// Total time from job start until the session was running
    pub fn time_to_session_ms(&self) -> Option<u64> {
        match (self.connect_ms, self.assemble_ms, self.session_start_ms) {
            (Some(c), Some(a), Some(s)) => Some(c + a + s),
            _ => None,
        }
    }

    /// Generate a summary string
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(ms) = self.connect_ms {
            parts.push(format!("connect: {}ms", ms));
        }
        if let Some(ms) = self.assemble_ms {
            parts.push(format!("assemble: {}ms", ms));
        }
        if let Some(ms) = self.session_start_ms {
            parts.push(format!("start: {}ms", ms));
        }
        if let Some(ms) = self.greeting_wait_ms {
            parts.push(format!("greeting wait: {}ms", ms));
        }

        parts.join(" | ")
    }
}
