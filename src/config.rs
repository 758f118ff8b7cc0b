//! Agent configuration loaded from the environment
//!
//! Credentials are only checked when a capability client asks for them, so a
//! missing provider key fails the job at the point that provider is built.
//! Tunables are parsed up front.

use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const LIVEKIT_URL: &str = "LIVEKIT_URL";
pub const LIVEKIT_API_KEY: &str = "LIVEKIT_API_KEY";
pub const LIVEKIT_API_SECRET: &str = "LIVEKIT_API_SECRET";
pub const DEEPGRAM_API_KEY: &str = "DEEPGRAM_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Greeting spoken once the session is running
pub const DEFAULT_GREETING: &str = "Hey, how can I help you today?";

/// Room service credentials (API key + secret)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Settings for the four capability clients and the room service
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Room service URL
    room_url: Option<String>,

    /// Room service credentials, only set when both halves are present
    room_credentials: Option<RoomCredentials>,

    deepgram_api_key: Option<String>,
    openai_api_key: Option<String>,

    /// LLM model identifier
    pub llm_model: String,

    /// STT model identifier
    pub stt_model: String,

    /// STT language tag
    pub stt_language: String,

    /// TTS model identifier
    pub tts_model: String,

    /// TTS voice name
    pub tts_voice: String,

    /// VAD activation threshold (0.0 - 1.0)
    pub vad_threshold: f32,

    /// Greeting text
    pub greeting: String,

    /// Fixed wait between session start and the greeting
    pub greeting_delay: Duration,

    /// Granularity of the idle loop
    pub idle_tick: Duration,

    /// Maximum concurrent jobs per worker
    pub max_jobs: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            room_url: None,
            room_credentials: None,
            deepgram_api_key: None,
            openai_api_key: None,
            llm_model: "gpt-4o".to_string(),
            stt_model: "nova-2-general".to_string(),
            stt_language: "en-US".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            vad_threshold: 0.5,
            greeting: DEFAULT_GREETING.to_string(),
            greeting_delay: Duration::from_secs(1),
            idle_tick: Duration::from_secs(1),
            max_jobs: 8,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values are treated the same as unset ones
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let room_credentials = match (get(LIVEKIT_API_KEY), get(LIVEKIT_API_SECRET)) {
            (Some(api_key), Some(api_secret)) => Some(RoomCredentials {
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let vad_threshold: f32 = parse_or(&get, "PARLEY_VAD_THRESHOLD", defaults.vad_threshold)?;
        if !(0.0..=1.0).contains(&vad_threshold) {
            return Err(ConfigError::InvalidSetting {
                name: "PARLEY_VAD_THRESHOLD".to_string(),
                reason: format!("{} is outside 0.0..=1.0", vad_threshold),
            });
        }

        let idle_tick_ms: u64 = parse_or(&get, "PARLEY_IDLE_TICK_MS", 1000)?;
        if idle_tick_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "PARLEY_IDLE_TICK_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let max_jobs: usize = parse_or(&get, "PARLEY_MAX_JOBS", defaults.max_jobs)?;
        if max_jobs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "PARLEY_MAX_JOBS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            room_url: get(LIVEKIT_URL),
            room_credentials,
            deepgram_api_key: get(DEEPGRAM_API_KEY),
            openai_api_key: get(OPENAI_API_KEY),
            llm_model: get("PARLEY_LLM_MODEL").unwrap_or(defaults.llm_model),
            stt_model: get("PARLEY_STT_MODEL").unwrap_or(defaults.stt_model),
            stt_language: get("PARLEY_STT_LANGUAGE").unwrap_or(defaults.stt_language),
            tts_model: get("PARLEY_TTS_MODEL").unwrap_or(defaults.tts_model),
            tts_voice: get("PARLEY_TTS_VOICE").unwrap_or(defaults.tts_voice),
            vad_threshold,
            greeting: get("PARLEY_GREETING").unwrap_or(defaults.greeting),
            greeting_delay: Duration::from_millis(parse_or(&get, "PARLEY_GREETING_DELAY_MS", 1000)?),
            idle_tick: Duration::from_millis(idle_tick_ms),
            max_jobs,
        })
    }

    /// Room service URL, if configured
    pub fn room_url(&self) -> Option<&str> {
        self.room_url.as_deref()
    }

    /// Room service credentials, if both key and secret are configured
    pub fn room_credentials(&self) -> Option<&RoomCredentials> {
        self.room_credentials.as_ref()
    }

    /// Deepgram key, required by the STT client
    pub fn require_deepgram_api_key(&self) -> Result<&str, ConfigError> {
        self.deepgram_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequiredSetting(DEEPGRAM_API_KEY.to_string()))
    }

    /// OpenAI key, required by the LLM and TTS clients
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequiredSetting(OPENAI_API_KEY.to_string()))
    }

    /// Set the Deepgram key
    pub fn with_deepgram_api_key(mut self, key: impl Into<String>) -> Self {
        self.deepgram_api_key = Some(key.into());
        self
    }

    /// Set the OpenAI key
    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    /// Set the room service URL
    pub fn with_room_url(mut self, url: impl Into<String>) -> Self {
        self.room_url = Some(url.into());
        self
    }

    /// Set the greeting delay
    pub fn with_greeting_delay(mut self, delay: Duration) -> Self {
        self.greeting_delay = delay;
        self
    }

    /// Set the idle tick
    pub fn with_idle_tick(mut self, tick: Duration) -> Self {
        self.idle_tick = tick;
        self
    }

    /// Options the entry point runs each job with
    pub fn job_options(&self) -> JobOptions {
        JobOptions::default()
            .with_greeting(self.greeting.clone())
            .with_greeting_delay(self.greeting_delay)
            .with_idle_tick(self.idle_tick)
    }
}

/// A missing `.env` is fine; one that exists but cannot be read or parsed is not
fn check_dotenv(loaded: Result<PathBuf, dotenvy::Error>) -> Result<(), ConfigError> {
    match loaded {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::InvalidSetting {
            name: ".env".to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidSetting {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Per-job behaviour of the entry point
#[derive(Clone, Debug)]
pub struct JobOptions {
    /// Scripted greeting
    pub greeting: String,

    /// Whether the user may speak over the greeting
    pub allow_interruptions: bool,

    /// Fixed wait after session start before greeting
    pub greeting_delay: Duration,

    /// Upper bound on waiting for a session readiness signal
    pub readiness_timeout: Duration,

    /// Idle loop granularity (also the bound on shutdown latency)
    pub idle_tick: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            allow_interruptions: true,
            greeting_delay: Duration::from_secs(1),
            readiness_timeout: Duration::from_secs(5),
            idle_tick: Duration::from_secs(1),
        }
    }
}

impl JobOptions {
    /// Set the greeting text
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Set the fixed greeting delay
    pub fn with_greeting_delay(mut self, delay: Duration) -> Self {
        self.greeting_delay = delay;
        self
    }

    /// Set the readiness timeout
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Set the idle tick
    pub fn with_idle_tick(mut self, tick: Duration) -> Self {
        self.idle_tick = tick;
        self
    }
}
