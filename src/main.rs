use anyhow::{Context, Result};
use parley::loopback::{ConsoleAssistantFactory, LoopbackConnector};
use parley::{Agent, AgentConfig, JobRequest, ProviderSet, Worker, WorkerEvent, WorkerOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley voice agent");

    let config = Arc::new(AgentConfig::from_env().context("failed to load configuration")?);

    let agent = Agent::new(
        Arc::new(LoopbackConnector::from_config(&config)),
        ProviderSet::standard(),
        Arc::new(ConsoleAssistantFactory),
        config.job_options(),
    );
    let (worker, handle) = Worker::new(agent, Arc::clone(&config), WorkerOptions::from_config(&config));
    let worker_task = tokio::spawn(worker.run());

    let mut rooms: Vec<String> = std::env::args().skip(1).collect();
    if rooms.is_empty() {
        rooms.push("parley-dev".to_string());
    }
    for room in rooms {
        handle.dispatch(JobRequest::new(room))?;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                // A repeat Ctrl-C finds the worker already stopping
                if let Err(e) = handle.shutdown() {
                    warn!("Shutdown already in progress: {}", e);
                }
            }
            _ = ticker.tick() => {}
        }

        let mut stopped = false;
        while let Some(event) = handle.try_recv_event() {
            match event {
                WorkerEvent::JobFailed { job_id, error } => {
                    error!(job = %job_id, kind = error.kind(), "{}", error);
                    warn!(job = %job_id, "{}", error.user_message());
                }
                WorkerEvent::JobRejected { room_name, reason, .. } => {
                    warn!("Room {} rejected: {}", room_name, reason)
                }
                WorkerEvent::Shutdown => stopped = true,
                _ => {}
            }
        }
        if stopped {
            break;
        }
    }

    worker_task.await.context("worker task panicked")?;
    Ok(())
}
