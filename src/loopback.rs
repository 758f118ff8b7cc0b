//! In-process room and console assistant for local runs
//!
//! The loopback connector "joins" rooms without a media server, and the
//! console assistant logs what it would say and records it in the
//! conversation context. Together with the standard providers this lets the
//! whole job lifecycle run on a developer machine.

use crate::capabilities::Capabilities;
use crate::config::AgentConfig;
use crate::error::{ConnectionError, SessionError};
use crate::llm::SharedContext;
use crate::room::{AutoSubscribe, ConnectedRoom, JobHandle, RoomConnector};
use crate::session::{AssistantSession, Readiness, SessionFactory};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

const LOOPBACK_URL: &str = "loopback://local";

/// A room joined through the loopback connector
#[derive(Debug)]
pub struct LoopbackRoom {
    name: String,
    subscription: AutoSubscribe,
}

impl ConnectedRoom for LoopbackRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscription(&self) -> AutoSubscribe {
        self.subscription
    }
}

/// Joins rooms in-process
#[derive(Clone, Debug)]
pub struct LoopbackConnector {
    url: String,
    authenticated: bool,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self {
            url: LOOPBACK_URL.to_string(),
            authenticated: false,
        }
    }

    /// Mirror the configured room service URL and credentials
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            url: config.room_url().unwrap_or(LOOPBACK_URL).to_string(),
            authenticated: config.room_credentials().is_some(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomConnector for LoopbackConnector {
    async fn connect(
        &self,
        job: &JobHandle,
        subscription: AutoSubscribe,
    ) -> Result<Arc<dyn ConnectedRoom>, ConnectionError> {
        if job.room_name.trim().is_empty() {
            return Err(ConnectionError::Rejected("room name is empty".to_string()));
        }

        debug!(
            "Joining loopback room {} at {} ({:?}, authenticated: {})",
            job.room_name, self.url, subscription, self.authenticated
        );
        Ok(Arc::new(LoopbackRoom {
            name: job.room_name.clone(),
            subscription,
        }))
    }
}

/// Session that speaks by logging
pub struct ConsoleAssistant {
    capabilities: Capabilities,
    context: SharedContext,
    room: Mutex<Option<Arc<dyn ConnectedRoom>>>,
    ready_tx: watch::Sender<bool>,
}

impl ConsoleAssistant {
    pub fn new(capabilities: Capabilities, context: SharedContext) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            capabilities,
            context,
            room: Mutex::new(None),
            ready_tx,
        }
    }

    /// Name of the room the session was started in
    pub fn room_name(&self) -> Option<String> {
        self.room.lock().as_ref().map(|room| room.name().to_string())
    }
}

#[async_trait]
impl AssistantSession for ConsoleAssistant {
    async fn start(&self, room: Arc<dyn ConnectedRoom>) -> Result<(), SessionError> {
        if !room.subscription().includes_audio() {
            return Err(SessionError::StartFailed(format!(
                "room {} was joined without audio",
                room.name()
            )));
        }

        {
            let mut slot = self.room.lock();
            if slot.is_some() {
                return Err(SessionError::StartFailed("session already started".to_string()));
            }
            *slot = Some(Arc::clone(&room));
        }

        let caps = &self.capabilities;
        info!(
            "Console assistant listening in {} (vad: {}, stt: {}/{}, llm: {}/{}, tts: {}/{})",
            room.name(),
            caps.vad.provider(),
            caps.stt.provider(),
            caps.stt.model(),
            caps.llm.provider(),
            caps.llm.model(),
            caps.tts.provider(),
            caps.tts.voice(),
        );
        self.ready_tx.send_replace(true);
        Ok(())
    }

    async fn say(&self, text: &str, allow_interruptions: bool) -> Result<(), SessionError> {
        let Some(room) = self.room_name() else {
            return Err(SessionError::SayFailed("session not started".to_string()));
        };

        info!(room = %room, interruptible = allow_interruptions, "[assistant] {}", text);
        self.context.write().add_assistant_message(text);
        Ok(())
    }

    async fn wait_ready(&self) -> Readiness {
        let mut ready_rx = self.ready_tx.subscribe();
        let ready = ready_rx.wait_for(|ready| *ready).await.is_ok();
        if ready {
            Readiness::Ready
        } else {
            Readiness::Unsupported
        }
    }
}

/// Builds console assistants
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleAssistantFactory;

impl SessionFactory for ConsoleAssistantFactory {
    fn create(
        &self,
        capabilities: Capabilities,
        context: SharedContext,
    ) -> Result<Box<dyn AssistantSession>, SessionError> {
        Ok(Box::new(ConsoleAssistant::new(capabilities, context)))
    }
}
