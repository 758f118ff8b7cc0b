//! Worker tests: dispatch, cancellation, failure reporting and shutdown

mod common;

use common::*;
use parley::{
    AgentConfig, Capability, ConnectionError, GreetingOutcome, JobId, JobRequest, JobState,
    Worker, WorkerEvent, WorkerHandle, WorkerOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn start_worker(
    connector: FakeConnector,
    providers: FakeProvider,
    options: WorkerOptions,
) -> (WorkerHandle, JoinHandle<()>) {
    start_worker_with(
        connector,
        providers,
        Arc::new(FakeSessionFactory::default()),
        options,
    )
}

fn start_worker_with(
    connector: FakeConnector,
    providers: FakeProvider,
    sessions: Arc<FakeSessionFactory>,
    options: WorkerOptions,
) -> (WorkerHandle, JoinHandle<()>) {
    let agent = agent(Arc::new(connector), Arc::new(providers), sessions);
    let (worker, handle) = Worker::new(agent, Arc::new(AgentConfig::default()), options);
    (handle, tokio::spawn(worker.run()))
}

/// Poll events until one matches, returning it
async fn next_matching(
    handle: &WorkerHandle,
    mut pred: impl FnMut(&WorkerEvent) -> bool,
) -> WorkerEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        while let Some(event) = handle.try_recv_event() {
            if pred(&event) {
                return event;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected worker event never arrived"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn reached(job: JobId, state: JobState) -> impl FnMut(&WorkerEvent) -> bool {
    move |event| matches!(event, WorkerEvent::StateChanged { job_id, to, .. } if *job_id == job && *to == state)
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_run_and_cancel() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    let job = handle.dispatch(JobRequest::new("lobby")).unwrap();

    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobAccepted { .. })).await {
        WorkerEvent::JobAccepted { job_id, room_name } => {
            assert_eq!(job_id, job);
            assert_eq!(room_name, "lobby");
        }
        _ => unreachable!(),
    }

    match next_matching(&handle, |e| matches!(e, WorkerEvent::Greeting { .. })).await {
        WorkerEvent::Greeting { outcome, .. } => assert_eq!(outcome, GreetingOutcome::Spoken),
        _ => unreachable!(),
    }
    next_matching(&handle, reached(job, JobState::Idling)).await;
    assert_eq!(handle.active_jobs(), 1);

    handle.cancel(job).unwrap();
    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobFinished { .. })).await {
        WorkerEvent::JobFinished { job_id, outcome } => {
            assert_eq!(job_id, job);
            assert_eq!(outcome.greeting, GreetingOutcome::Spoken);
        }
        _ => unreachable!(),
    }
    assert_eq!(handle.active_jobs(), 0);

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_reported() {
    let (handle, worker) = start_worker(
        FakeConnector::failing(ConnectionError::Rejected("bad token".to_string())),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    let job = handle.dispatch(JobRequest::new("lobby")).unwrap();
    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobFailed { .. })).await {
        WorkerEvent::JobFailed { job_id, error } => {
            assert_eq!(job_id, job);
            assert_eq!(error.kind(), "connection.rejected");
            assert!(error.to_string().contains("bad token"));
            assert!(!error.is_recoverable());
        }
        _ => unreachable!(),
    }
    assert_eq!(handle.active_jobs(), 0);

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_capability_failure_reported() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::failing(Capability::Tts),
        WorkerOptions::default(),
    );

    handle.dispatch(JobRequest::new("lobby")).unwrap();
    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobFailed { .. })).await {
        WorkerEvent::JobFailed { error, .. } => {
            assert_eq!(error.kind(), "capability_init");
            assert!(error.user_message().contains("TTS"), "{}", error.user_message());
        }
        _ => unreachable!(),
    }

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_jobs_beyond_limit_rejected() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::default(),
        WorkerOptions::default().with_max_jobs(1),
    );

    let first = handle.dispatch(JobRequest::new("one")).unwrap();
    next_matching(&handle, reached(first, JobState::Idling)).await;

    let second = handle.dispatch(JobRequest::new("two")).unwrap();
    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobRejected { .. })).await {
        WorkerEvent::JobRejected {
            job_id, room_name, ..
        } => {
            assert_eq!(job_id, second);
            assert_eq!(room_name, "two");
        }
        _ => unreachable!(),
    }
    assert_eq!(handle.active_jobs(), 1);

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_jobs_run_independently() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    let a = handle.dispatch(JobRequest::new("a")).unwrap();
    let b = handle.dispatch(JobRequest::new("b")).unwrap();
    next_matching(&handle, reached(a, JobState::Idling)).await;
    assert_eq!(handle.active_jobs(), 2);

    // Cancelling one job leaves the other idling
    handle.cancel(a).unwrap();
    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobFinished { .. })).await {
        WorkerEvent::JobFinished { job_id, .. } => assert_eq!(job_id, a),
        _ => unreachable!(),
    }
    assert_eq!(handle.active_jobs(), 1);
    assert_ne!(a, b);

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_jobs() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    let job = handle.dispatch(JobRequest::new("lobby")).unwrap();
    next_matching(&handle, reached(job, JobState::Idling)).await;

    handle.shutdown().unwrap();
    let mut finished = false;
    loop {
        match next_matching(&handle, |_| true).await {
            WorkerEvent::JobFinished { job_id, .. } => {
                assert_eq!(job_id, job);
                finished = true;
            }
            WorkerEvent::Shutdown => break,
            _ => {}
        }
    }

    assert!(finished, "running job was not reported before shutdown");
    assert_eq!(handle.active_jobs(), 0);
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_connecting_completes() {
    let (handle, worker) = start_worker(
        FakeConnector::hanging(),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    let job = handle.dispatch(JobRequest::new("lobby")).unwrap();
    next_matching(&handle, reached(job, JobState::Connecting)).await;

    handle.shutdown().unwrap();
    match next_matching(&handle, |e| {
        matches!(e, WorkerEvent::JobFinished { .. } | WorkerEvent::JobFailed { .. })
    })
    .await
    {
        WorkerEvent::JobFinished { job_id, outcome } => {
            assert_eq!(job_id, job);
            assert_eq!(outcome.greeting, GreetingOutcome::Skipped);
        }
        other => panic!("cancelled job should finish cleanly, got {:?}", other),
    }
    next_matching(&handle, |e| matches!(e, WorkerEvent::Shutdown)).await;
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_job_that_ignores_cancel() {
    let sessions = Arc::new(FakeSessionFactory {
        say_hangs: true,
        ..Default::default()
    });
    let grace = Duration::from_secs(2);
    let (handle, worker) = start_worker_with(
        FakeConnector::default(),
        FakeProvider::default(),
        Arc::clone(&sessions),
        WorkerOptions::default().with_shutdown_grace(grace),
    );

    let job = handle.dispatch(JobRequest::new("lobby")).unwrap();
    wait_until(Duration::from_secs(10), || sessions.log.say_count() == 1).await;

    let asked = tokio::time::Instant::now();
    handle.shutdown().unwrap();
    match next_matching(&handle, |e| matches!(e, WorkerEvent::JobFailed { .. })).await {
        WorkerEvent::JobFailed { job_id, error } => {
            assert_eq!(job_id, job);
            assert_eq!(error.kind(), "shutdown_timeout");
        }
        _ => unreachable!(),
    }
    next_matching(&handle, |e| matches!(e, WorkerEvent::Shutdown)).await;
    assert!(tokio::time::Instant::now() - asked >= grace);
    assert_eq!(handle.active_jobs(), 0);
    worker.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_accepted_is_first_event() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    for room in ["a", "b", "c", "d"] {
        let job = handle.dispatch(JobRequest::new(room)).unwrap();
        let first = next_matching(&handle, |e| match e {
            WorkerEvent::JobAccepted { job_id, .. } | WorkerEvent::StateChanged { job_id, .. } => {
                *job_id == job
            }
            _ => false,
        })
        .await;
        assert!(
            matches!(first, WorkerEvent::JobAccepted { .. }),
            "first event was {:?}",
            first
        );
    }

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_shutdown_reports_closed_channel() {
    let (handle, worker) = start_worker(
        FakeConnector::default(),
        FakeProvider::default(),
        WorkerOptions::default(),
    );

    handle.shutdown().unwrap();
    worker.await.unwrap();

    let err = handle.shutdown().unwrap_err();
    assert_eq!(err.kind(), "channel");
    assert!(!err.is_recoverable());
}
