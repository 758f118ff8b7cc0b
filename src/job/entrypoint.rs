//! Job entry point
//!
//! Runs one job from start to finish: join the room (audio only), assemble the
//! capability clients and conversation context into a session, start it, greet
//! once and then keep the session alive until the job is cancelled.
//!
//! Every step waits for the previous one. Any failure before the session is
//! running ends the job with an error and nothing is started. A failed
//! greeting is reported and the job keeps running without it. Cancellation
//! ends the job wherever it is.

use crate::capabilities::ProviderSet;
use crate::config::{AgentConfig, JobOptions};
use crate::job::JobState;
use crate::llm::new_context;
use crate::observer::{GreetingOutcome, JobObserver, TracingObserver};
use crate::room::{AutoSubscribe, JobHandle, JobId, RoomConnector};
use crate::session::{AssistantSession, Readiness, SessionFactory};
use crate::utils::{StartupTimings, Stopwatch};
use crate::{ParleyError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one job invocation is handed by the worker
#[derive(Clone)]
pub struct JobContext {
    /// Job identity and room
    pub handle: JobHandle,

    /// Settings for capability clients
    pub config: Arc<AgentConfig>,

    /// Fires when the worker wants the job gone
    pub cancel: CancellationToken,

    /// Where lifecycle notifications go
    pub observer: Arc<dyn JobObserver>,
}

impl JobContext {
    /// Create a context with a fresh cancellation token and a tracing observer
    pub fn new(handle: JobHandle, config: Arc<AgentConfig>) -> Self {
        Self {
            handle,
            config,
            cancel: CancellationToken::new(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Use the given cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use the given observer
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// How a job ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: JobId,

    /// What happened to the greeting
    pub greeting: GreetingOutcome,

    /// Idle loop iterations before cancellation
    pub idle_ticks: u64,

    /// Startup phase timings
    pub timings: StartupTimings,
}

/// Tracks the current state and reports each step to the observer
struct Lifecycle<'a> {
    ctx: &'a JobContext,
    state: JobState,
}

impl<'a> Lifecycle<'a> {
    fn new(ctx: &'a JobContext) -> Self {
        Self {
            ctx,
            state: JobState::Created,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.state,
            next
        );
        let from = std::mem::replace(&mut self.state, next);
        self.ctx.observer.on_transition(&self.ctx.handle, from, next);
    }
}

/// The agent: a fixed pipeline of room connector, capability providers and
/// session factory, run once per job
#[derive(Clone)]
pub struct Agent {
    connector: Arc<dyn RoomConnector>,
    providers: ProviderSet,
    sessions: Arc<dyn SessionFactory>,
    options: JobOptions,
}

impl Agent {
    pub fn new(
        connector: Arc<dyn RoomConnector>,
        providers: ProviderSet,
        sessions: Arc<dyn SessionFactory>,
        options: JobOptions,
    ) -> Self {
        Self {
            connector,
            providers,
            sessions,
            options,
        }
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Run one job until it is cancelled or fails
    ///
    /// Cancellation is honoured at every await. A job cancelled before its
    /// session is running ends in `Terminated` without starting one.
    pub async fn run(&self, ctx: JobContext) -> Result<JobOutcome> {
        let mut lifecycle = Lifecycle::new(&ctx);
        let mut stopwatch = Stopwatch::start();
        info!(job = %ctx.handle.id, "Entrypoint called for room: {}", ctx.handle.room_name);

        let context = new_context().into_shared();

        lifecycle.advance(JobState::Connecting);
        info!("Connecting to room: {}", ctx.handle.room_name);
        let connect = self.connector.connect(&ctx.handle, AutoSubscribe::AudioOnly);
        let room = match until_cancelled(&ctx.cancel, connect).await {
            Some(room) => room?,
            None => return Ok(abandon(lifecycle, &stopwatch)),
        };
        stopwatch.lap(StartupTimings::CONNECT);
        lifecycle.advance(JobState::Connected);
        info!("Connected to room: {}", room.name());

        lifecycle.advance(JobState::SessionStarting);
        let assemble = self.providers.assemble(&ctx.config);
        let capabilities = match until_cancelled(&ctx.cancel, assemble).await {
            Some(capabilities) => capabilities?,
            None => return Ok(abandon(lifecycle, &stopwatch)),
        };
        stopwatch.lap(StartupTimings::ASSEMBLE);

        let session = self.sessions.create(capabilities, Arc::clone(&context))?;
        info!("Starting voice assistant");
        match until_cancelled(&ctx.cancel, session.start(room)).await {
            Some(started) => started?,
            None => return Ok(abandon(lifecycle, &stopwatch)),
        }
        stopwatch.lap(StartupTimings::SESSION_START);
        lifecycle.advance(JobState::SessionRunning);

        let greeting = self.greet(&ctx, session.as_ref()).await?;
        stopwatch.lap(StartupTimings::GREETING_WAIT);
        ctx.observer.on_greeting(&ctx.handle, &greeting);

        let timings = StartupTimings::from_stopwatch(&stopwatch);
        debug!(job = %ctx.handle.id, "Startup timings: {}", timings.summary());

        let idle_ticks = if greeting == GreetingOutcome::Skipped {
            0
        } else {
            lifecycle.advance(JobState::Idling);
            self.idle(&ctx).await
        };

        lifecycle.advance(JobState::Terminated);
        // The session lives exactly as long as the job
        drop(session);
        info!(job = %ctx.handle.id, "Job ended after {:?}", stopwatch.elapsed());

        Ok(JobOutcome {
            job_id: ctx.handle.id,
            greeting,
            idle_ticks,
            timings,
        })
    }

    /// Wait out the startup delay (and readiness, if the session reports it),
    /// then speak the greeting once
    ///
    /// A greeting the session refuses is only fatal when the error says the
    /// session can no longer be used.
    async fn greet(
        &self,
        ctx: &JobContext,
        session: &dyn AssistantSession,
    ) -> Result<GreetingOutcome> {
        let delay = time::sleep(self.options.greeting_delay);
        let ready = time::timeout(self.options.readiness_timeout, session.wait_ready());
        let gate = async { tokio::join!(delay, ready).1 };

        let Some(readiness) = until_cancelled(&ctx.cancel, gate).await else {
            return Ok(GreetingOutcome::Skipped);
        };
        match readiness {
            Ok(Readiness::Ready) => debug!("Session reported ready"),
            Ok(Readiness::Unsupported) => {}
            Err(_) => warn!(
                "Session not ready after {:?}, greeting anyway",
                self.options.readiness_timeout
            ),
        }

        info!("Attempting to say greeting");
        match session
            .say(&self.options.greeting, self.options.allow_interruptions)
            .await
        {
            Ok(()) => Ok(GreetingOutcome::Spoken),
            Err(e) => {
                if ParleyError::from(e.clone()).is_recoverable() {
                    Ok(GreetingOutcome::Failed(e))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Keep the job alive until cancelled, ticking at the configured granularity
    async fn idle(&self, ctx: &JobContext) -> u64 {
        let tick = self.options.idle_tick;
        let mut ticker = time::interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    ctx.observer.on_idle_tick(&ctx.handle, ticks);
                }
            }
        }

        debug!(job = %ctx.handle.id, ticks, "Idle loop cancelled");
        ticks
    }
}

/// Drive `step` unless `cancel` fires first; `None` means cancelled
async fn until_cancelled<F: Future>(cancel: &CancellationToken, step: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = step => Some(out),
    }
}

/// End a job that was cancelled before its session was running
fn abandon(mut lifecycle: Lifecycle<'_>, stopwatch: &Stopwatch) -> JobOutcome {
    let ctx = lifecycle.ctx;
    let job = &ctx.handle;
    info!(job = %job.id, "Job cancelled while {}, nothing left running", lifecycle.state);
    lifecycle.advance(JobState::Terminated);
    JobOutcome {
        job_id: job.id,
        greeting: GreetingOutcome::Skipped,
        idle_ticks: 0,
        timings: StartupTimings::from_stopwatch(stopwatch),
    }
}
