//! Worker runtime
//!
//! Receives job requests, runs the agent once per job on its own task and
//! reports what happens as [`WorkerEvent`]s. Jobs share nothing but the
//! read-only agent and configuration. The worker never retries a failed job;
//! failures are reported and left to whoever dispatched the job.

use crate::config::AgentConfig;
use crate::job::{Agent, JobContext, JobOutcome, JobState};
use crate::observer::{GreetingOutcome, JobObserver};
use crate::room::{JobHandle, JobId, JobRequest};
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Commands that can be sent to the worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Run the agent for this job
    Dispatch(JobHandle),

    /// Cancel a running job
    Cancel(JobId),

    /// Cancel every job and stop
    Shutdown,
}

/// Events emitted by the worker
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was accepted and its task spawned
    JobAccepted { job_id: JobId, room_name: String },

    /// A job was refused without running
    JobRejected {
        job_id: JobId,
        room_name: String,
        reason: String,
    },

    /// A job moved to a new lifecycle state
    StateChanged {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },

    /// A job's greeting was attempted (or skipped)
    Greeting {
        job_id: JobId,
        outcome: GreetingOutcome,
    },

    /// A job ended with an error
    JobFailed { job_id: JobId, error: ParleyError },

    /// A job ended after cancellation
    JobFinished { job_id: JobId, outcome: JobOutcome },

    /// The worker has shut down
    Shutdown,
}

/// Worker settings
#[derive(Clone, Debug)]
pub struct WorkerOptions {
    /// Maximum number of jobs running at once
    pub max_jobs: usize,

    /// Capacity of the event channel
    pub event_capacity: usize,

    /// How long shutdown waits for cancelled jobs before aborting them
    pub shutdown_grace: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_jobs: 8,
            event_capacity: 256,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl WorkerOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_jobs: config.max_jobs,
            ..Default::default()
        }
    }

    /// Set the job limit
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

fn emit(events: &Sender<WorkerEvent>, event: WorkerEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!("Worker event channel full, dropping {:?}", event),
        // Nobody is listening any more
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Forwards job notifications onto the worker's event channel
struct EventObserver {
    events: Sender<WorkerEvent>,
}

impl JobObserver for EventObserver {
    fn on_transition(&self, job: &JobHandle, from: JobState, to: JobState) {
        debug!(job = %job.id, "{} -> {}", from, to);
        emit(
            &self.events,
            WorkerEvent::StateChanged {
                job_id: job.id,
                from,
                to,
            },
        );
    }

    fn on_greeting(&self, job: &JobHandle, outcome: &GreetingOutcome) {
        if let GreetingOutcome::Failed(e) = outcome {
            warn!(job = %job.id, "Greeting failed, session left running: {}", e);
        }
        emit(
            &self.events,
            WorkerEvent::Greeting {
                job_id: job.id,
                outcome: outcome.clone(),
            },
        );
    }
}

/// Handle for controlling a running worker
#[derive(Clone)]
pub struct WorkerHandle {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    event_rx: Receiver<WorkerEvent>,
    active_jobs: Arc<AtomicUsize>,
}

impl WorkerHandle {
    /// Send a command to the worker
    pub fn send_command(&self, cmd: WorkerCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| ParleyError::Channel(format!("Failed to send command: {}", e)))
    }

    /// Ask the worker to run a job; returns the id it will run under
    pub fn dispatch(&self, request: JobRequest) -> Result<JobId> {
        let handle = JobHandle::from(request);
        let job_id = handle.id;
        self.send_command(WorkerCommand::Dispatch(handle))?;
        Ok(job_id)
    }

    /// Cancel one job
    pub fn cancel(&self, job_id: JobId) -> Result<()> {
        self.send_command(WorkerCommand::Cancel(job_id))
    }

    /// Cancel all jobs and stop the worker
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(WorkerCommand::Shutdown)
    }

    /// Try to receive an event from the worker
    pub fn try_recv_event(&self) -> Option<WorkerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Get the event receiver
    pub fn event_receiver(&self) -> Receiver<WorkerEvent> {
        self.event_rx.clone()
    }

    /// Number of jobs currently running
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }
}

struct RunningJob {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Supervises jobs for one agent
pub struct Worker {
    agent: Arc<Agent>,
    config: Arc<AgentConfig>,
    options: WorkerOptions,
    command_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    event_tx: Sender<WorkerEvent>,
    done_tx: mpsc::UnboundedSender<(JobId, Result<JobOutcome>)>,
    done_rx: mpsc::UnboundedReceiver<(JobId, Result<JobOutcome>)>,
    jobs: HashMap<JobId, RunningJob>,
    active_jobs: Arc<AtomicUsize>,
    root: CancellationToken,
}

impl Worker {
    /// Create a worker and the handle that controls it
    pub fn new(
        agent: Agent,
        config: Arc<AgentConfig>,
        options: WorkerOptions,
    ) -> (Self, WorkerHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = bounded(options.event_capacity);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let active_jobs = Arc::new(AtomicUsize::new(0));

        let handle = WorkerHandle {
            command_tx,
            event_rx,
            active_jobs: Arc::clone(&active_jobs),
        };

        let worker = Self {
            agent: Arc::new(agent),
            config,
            options,
            command_rx,
            event_tx,
            done_tx,
            done_rx,
            jobs: HashMap::new(),
            active_jobs,
            root: CancellationToken::new(),
        };

        (worker, handle)
    }

    /// Run until shut down or until every handle is dropped
    pub async fn run(mut self) {
        info!("Worker started (max {} jobs)", self.options.max_jobs);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(WorkerCommand::Dispatch(handle)) => self.spawn_job(handle),
                    Some(WorkerCommand::Cancel(job_id)) => self.cancel_job(job_id),
                    Some(WorkerCommand::Shutdown) => {
                        info!("Worker shutdown requested");
                        break;
                    }
                    None => {
                        warn!("Command channel disconnected");
                        break;
                    }
                },
                Some((job_id, result)) = self.done_rx.recv() => self.finish_job(job_id, result),
            }
        }

        self.root.cancel();
        self.drain().await;
        emit(&self.event_tx, WorkerEvent::Shutdown);
        info!("Worker stopped");
    }

    fn spawn_job(&mut self, handle: JobHandle) {
        if self.jobs.len() >= self.options.max_jobs {
            warn!(job = %handle.id, "Rejecting job for room {}: worker at capacity", handle.room_name);
            emit(
                &self.event_tx,
                WorkerEvent::JobRejected {
                    job_id: handle.id,
                    room_name: handle.room_name,
                    reason: format!("worker at capacity ({} jobs)", self.options.max_jobs),
                },
            );
            return;
        }

        let job_id = handle.id;
        let cancel = self.root.child_token();
        let ctx = JobContext::new(handle.clone(), Arc::clone(&self.config))
            .with_cancel(cancel.clone())
            .with_observer(Arc::new(EventObserver {
                events: self.event_tx.clone(),
            }));

        info!(job = %job_id, "Accepted job for room {}", handle.room_name);
        emit(
            &self.event_tx,
            WorkerEvent::JobAccepted {
                job_id,
                room_name: handle.room_name,
            },
        );

        let agent = Arc::clone(&self.agent);
        let done_tx = self.done_tx.clone();
        let task = tokio::spawn(async move {
            let result = agent.run(ctx).await;
            let _ = done_tx.send((job_id, result));
        });

        self.jobs.insert(job_id, RunningJob { cancel, task });
        self.active_jobs.store(self.jobs.len(), Ordering::SeqCst);
    }

    fn cancel_job(&mut self, job_id: JobId) {
        match self.jobs.get(&job_id) {
            Some(job) => {
                debug!(job = %job_id, "Cancelling job");
                job.cancel.cancel();
            }
            None => warn!(job = %job_id, "Cancel requested for unknown job"),
        }
    }

    fn finish_job(&mut self, job_id: JobId, result: Result<JobOutcome>) {
        self.jobs.remove(&job_id);
        self.active_jobs.store(self.jobs.len(), Ordering::SeqCst);

        match result {
            Ok(outcome) => {
                info!(job = %job_id, "Job finished after {} idle ticks", outcome.idle_ticks);
                emit(&self.event_tx, WorkerEvent::JobFinished { job_id, outcome });
            }
            Err(error) => {
                error!(job = %job_id, kind = error.kind(), "Job failed: {}", error);
                emit(&self.event_tx, WorkerEvent::JobFailed { job_id, error });
            }
        }
    }

    /// Wait for every job task to end, reporting those that report back
    ///
    /// Tasks still running when the grace period is over are aborted and
    /// reported as failed.
    async fn drain(&mut self) {
        let grace = self.options.shutdown_grace;
        let deadline = Instant::now() + grace;
        let tasks: Vec<(JobId, JoinHandle<()>)> = self
            .jobs
            .drain()
            .map(|(job_id, job)| (job_id, job.task))
            .collect();

        for (job_id, mut task) in tasks {
            match time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(job = %job_id, "Job task did not finish cleanly: {}", e),
                Err(_) => {
                    warn!(job = %job_id, "Job ignored cancellation for {:?}, aborting", grace);
                    task.abort();
                    emit(
                        &self.event_tx,
                        WorkerEvent::JobFailed {
                            job_id,
                            error: ParleyError::ShutdownTimeout(grace),
                        },
                    );
                }
            }
        }

        while let Ok((job_id, result)) = self.done_rx.try_recv() {
            self.finish_job(job_id, result);
        }
        self.active_jobs.store(0, Ordering::SeqCst);
    }
}
