//! Parley: a voice-conversation agent runner
//!
//! For each job the agent joins a room (audio only), builds VAD, STT, LLM and
//! TTS clients, hands them and a seeded conversation context to an assistant
//! session, greets the user once and then stays out of the way until the job
//! is cancelled. The conversation itself is the session's business.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod job;
pub mod llm;
pub mod loopback;
pub mod observer;
pub mod room;
pub mod session;
pub mod utils;
pub mod worker;

pub use capabilities::{Capabilities, Capability, ProviderSet};
pub use config::{AgentConfig, JobOptions};
pub use error::{ConfigError, ConnectionError, ParleyError, ProviderError, SessionError};
pub use job::{Agent, JobContext, JobOutcome, JobState};
pub use observer::{GreetingOutcome, JobObserver, TracingObserver};
pub use room::{AutoSubscribe, ConnectedRoom, JobHandle, JobId, JobRequest, RoomConnector};
pub use session::{AssistantSession, Readiness, SessionFactory};
pub use worker::{Worker, WorkerCommand, WorkerEvent, WorkerHandle, WorkerOptions};

pub type Result<T> = std::result::Result<T, ParleyError>;
