//! Error types for the Parley agent
//!
//! Every error raised while running a job is fatal to that job except a failed
//! greeting, which the entry point reports and then carries on.

use crate::capabilities::Capability;
use std::time::Duration;
use thiserror::Error;

/// Problems with the settings read from the environment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting needed by a capability client is absent (or empty)
    #[error("Missing required setting: {0}")]
    MissingRequiredSetting(String),

    /// A setting is present but could not be parsed
    #[error("Invalid value for {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

/// Failures connecting to the room service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The transport could not reach the room service
    #[error("Room service unreachable: {0}")]
    Unreachable(String),

    /// The room service refused the connection
    #[error("Room service rejected connection: {0}")]
    Rejected(String),
}

/// Underlying cause of a capability factory failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Provider backend error: {0}")]
    Backend(String),
}

/// Failures reported by the assistant session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session failed to start: {0}")]
    StartFailed(String),

    #[error("Session failed to speak: {0}")]
    SayFailed(String),
}

/// Top-level error surfaced to the worker as a job failure
#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Failed to initialize {which} capability: {cause}")]
    CapabilityInit {
        which: Capability,
        #[source]
        cause: ProviderError,
    },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Channel error: {0}")]
    Channel(String),

    /// The job ignored cancellation and was aborted at shutdown
    #[error("Job did not stop within {0:?} of shutdown")]
    ShutdownTimeout(Duration),
}

impl ParleyError {
    /// Wrap a provider failure for the given capability
    pub fn capability(which: Capability, cause: impl Into<ProviderError>) -> Self {
        ParleyError::CapabilityInit {
            which,
            cause: cause.into(),
        }
    }

    /// Check if the job can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A missed greeting leaves the session usable
            ParleyError::Session(SessionError::SayFailed(_)) => true,
            ParleyError::Session(SessionError::StartFailed(_)) => false,
            ParleyError::Config(_) => false,
            ParleyError::Connection(_) => false,
            ParleyError::CapabilityInit { .. } => false,
            ParleyError::Channel(_) => false,
            ParleyError::ShutdownTimeout(_) => false,
        }
    }

    /// Short stable label used in logs and worker events
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::Config(_) => "config",
            ParleyError::Connection(ConnectionError::Unreachable(_)) => "connection.unreachable",
            ParleyError::Connection(ConnectionError::Rejected(_)) => "connection.rejected",
            ParleyError::CapabilityInit { .. } => "capability_init",
            ParleyError::Session(SessionError::StartFailed(_)) => "session.start_failed",
            ParleyError::Session(SessionError::SayFailed(_)) => "session.say_failed",
            ParleyError::Channel(_) => "channel",
            ParleyError::ShutdownTimeout(_) => "shutdown_timeout",
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::Config(_) => {
                "Configuration error. Please check the agent's environment settings.".to_string()
            }
            ParleyError::Connection(_) => {
                "Could not join the room. The assistant is unavailable.".to_string()
            }
            ParleyError::CapabilityInit { which, .. } => {
                format!("The {} engine could not be started. The assistant is unavailable.", which)
            }
            ParleyError::Session(SessionError::StartFailed(_)) => {
                "The voice session could not be started.".to_string()
            }
            ParleyError::Session(SessionError::SayFailed(_)) => {
                "The assistant could not speak its greeting, but is still listening.".to_string()
            }
            ParleyError::Channel(_) => {
                "Internal communication error. Please restart the agent.".to_string()
            }
            ParleyError::ShutdownTimeout(_) => {
                "The assistant was stopped before it finished leaving the room.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_display() {
        let err = ParleyError::capability(
            Capability::Stt,
            ConfigError::MissingRequiredSetting("DEEPGRAM_API_KEY".into()),
        );
        let text = err.to_string();
        assert!(text.contains("STT"));
        assert!(text.contains("DEEPGRAM_API_KEY"));
        assert_eq!(err.kind(), "capability_init");
    }

    #[test]
    fn test_only_say_failure_is_recoverable() {
        assert!(ParleyError::from(SessionError::SayFailed("tts down".into())).is_recoverable());
        assert!(!ParleyError::from(SessionError::StartFailed("no room".into())).is_recoverable());
        assert!(!ParleyError::from(ConnectionError::Rejected("bad token".into())).is_recoverable());
        assert!(!ParleyError::capability(Capability::Vad, ProviderError::Backend("x".into()))
            .is_recoverable());
    }

    #[test]
    fn test_user_message_names_capability() {
        let err = ParleyError::capability(Capability::Tts, ProviderError::Backend("boom".into()));
        assert!(err.user_message().contains("TTS"));
    }

    #[test]
    fn test_shutdown_timeout_is_fatal() {
        let err = ParleyError::ShutdownTimeout(Duration::from_secs(5));
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), "shutdown_timeout");
        assert!(err.to_string().contains("5s"));
    }
}
