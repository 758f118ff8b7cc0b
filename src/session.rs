//! Assistant session seam
//!
//! The session owns the live conversation once started: audio subscription and
//! publishing, turn-taking, interruption and streaming all happen inside it.
//! The job only starts it, greets once and keeps it alive.

use crate::capabilities::Capabilities;
use crate::error::SessionError;
use crate::llm::SharedContext;
use crate::room::ConnectedRoom;
use async_trait::async_trait;
use std::sync::Arc;

/// Whether a session can tell the job it is ready to speak
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// The session's pipeline reported it is ready
    Ready,
    /// The session has no readiness signal; the fixed delay is all there is
    Unsupported,
}

/// A running conversational pipeline bound to a room
#[async_trait]
pub trait AssistantSession: Send + Sync {
    /// Take over the room's audio and start the conversation
    async fn start(&self, room: Arc<dyn ConnectedRoom>) -> Result<(), SessionError>;

    /// Queue an utterance; `allow_interruptions` lets the user talk over it
    async fn say(&self, text: &str, allow_interruptions: bool) -> Result<(), SessionError>;

    /// Resolve once the pipeline can speak
    async fn wait_ready(&self) -> Readiness {
        Readiness::Unsupported
    }
}

/// Builds a session from a job's capabilities and conversation context
pub trait SessionFactory: Send + Sync {
    fn create(
        &self,
        capabilities: Capabilities,
        context: SharedContext,
    ) -> Result<Box<dyn AssistantSession>, SessionError>;
}
