//! Room service seam
//!
//! A job is scoped to one room. The connector joins that room on the job's
//! behalf and returns a handle the session takes over.

use crate::error::ConnectionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier of one job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to run the agent in a room
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub room_name: String,
}

impl JobRequest {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            room_name: room_name.into(),
        }
    }
}

/// Identity of one running job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub room_name: String,
    pub accepted_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            room_name: room_name.into(),
            accepted_at: Utc::now(),
        }
    }
}

impl From<JobRequest> for JobHandle {
    fn from(request: JobRequest) -> Self {
        Self::new(request.room_name)
    }
}

/// Which remote tracks the connection subscribes to automatically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoSubscribe {
    SubscribeAll,
    SubscribeNone,
    AudioOnly,
    VideoOnly,
}

impl AutoSubscribe {
    pub fn includes_audio(&self) -> bool {
        matches!(self, AutoSubscribe::SubscribeAll | AutoSubscribe::AudioOnly)
    }

    pub fn includes_video(&self) -> bool {
        matches!(self, AutoSubscribe::SubscribeAll | AutoSubscribe::VideoOnly)
    }
}

/// A joined room
pub trait ConnectedRoom: Send + Sync + fmt::Debug {
    /// Room name
    fn name(&self) -> &str;

    /// Subscription mode the room was joined with
    fn subscription(&self) -> AutoSubscribe;
}

/// Joins rooms on behalf of jobs
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(
        &self,
        job: &JobHandle,
        subscription: AutoSubscribe,
    ) -> Result<Arc<dyn ConnectedRoom>, ConnectionError>;
}
