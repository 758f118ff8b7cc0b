//! Speech and AI capability clients
//!
//! The agent never runs these engines itself. Each capability is reached
//! through a narrow handle trait, and each handle is produced by a provider
//! factory from the loaded [`AgentConfig`].
//!
//! All four factories must succeed before a session is assembled; the first
//! failure becomes [`ParleyError::CapabilityInit`] naming the capability.

pub mod providers;

use crate::config::AgentConfig;
use crate::error::{ParleyError, ProviderError};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub use providers::{DeepgramSttProvider, OpenAiLlmProvider, OpenAiTtsProvider, SileroVadProvider};

/// The four capabilities a voice session needs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Vad,
    Stt,
    Llm,
    Tts,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Vad => "VAD",
            Capability::Stt => "STT",
            Capability::Llm => "LLM",
            Capability::Tts => "TTS",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice activity detector handle
pub trait VoiceActivityDetector: Send + Sync + fmt::Debug {
    /// Provider name
    fn provider(&self) -> &str;

    /// Probability above which audio counts as speech
    fn activation_threshold(&self) -> f32;
}

/// Speech-to-text engine handle
pub trait SpeechToText: Send + Sync + fmt::Debug {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
    fn language(&self) -> &str;
}

/// Language-model engine handle
pub trait LanguageModel: Send + Sync + fmt::Debug {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
}

/// Text-to-speech engine handle
pub trait TextToSpeech: Send + Sync + fmt::Debug {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
    fn voice(&self) -> &str;
}

/// Factory for voice activity detectors
#[async_trait]
pub trait VadProvider: Send + Sync {
    async fn create_vad(
        &self,
        config: &AgentConfig,
    ) -> std::result::Result<Box<dyn VoiceActivityDetector>, ProviderError>;
}

/// Factory for speech-to-text engines
#[async_trait]
pub trait SttProvider: Send + Sync {
    async fn create_stt(
        &self,
        config: &AgentConfig,
    ) -> std::result::Result<Box<dyn SpeechToText>, ProviderError>;
}

/// Factory for language-model engines
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn create_llm(
        &self,
        config: &AgentConfig,
    ) -> std::result::Result<Box<dyn LanguageModel>, ProviderError>;
}

/// Factory for text-to-speech engines
#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn create_tts(
        &self,
        config: &AgentConfig,
    ) -> std::result::Result<Box<dyn TextToSpeech>, ProviderError>;
}

/// The four handles a session is assembled from, owned by one job
#[derive(Debug)]
pub struct Capabilities {
    pub vad: Box<dyn VoiceActivityDetector>,
    pub stt: Box<dyn SpeechToText>,
    pub llm: Box<dyn LanguageModel>,
    pub tts: Box<dyn TextToSpeech>,
}

/// One factory per capability
#[derive(Clone)]
pub struct ProviderSet {
    pub vad: Arc<dyn VadProvider>,
    pub stt: Arc<dyn SttProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub tts: Arc<dyn TtsProvider>,
}

impl ProviderSet {
    /// Create a provider set from explicit factories
    pub fn new(
        vad: Arc<dyn VadProvider>,
        stt: Arc<dyn SttProvider>,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<dyn TtsProvider>,
    ) -> Self {
        Self { vad, stt, llm, tts }
    }

    /// Silero VAD, Deepgram STT, OpenAI LLM and OpenAI TTS
    pub fn standard() -> Self {
        Self::new(
            Arc::new(SileroVadProvider),
            Arc::new(DeepgramSttProvider),
            Arc::new(OpenAiLlmProvider),
            Arc::new(OpenAiTtsProvider),
        )
    }

    /// Build all four handles for one job
    ///
    /// The factory calls are independent and are polled together on the
    /// caller's task. If any of them fails, the handles that did succeed are
    /// dropped and no bundle is returned.
    pub async fn assemble(&self, config: &AgentConfig) -> Result<Capabilities> {
        let vad = async {
            self.vad
                .create_vad(config)
                .await
                .map_err(|e| ParleyError::capability(Capability::Vad, e))
        };
        let stt = async {
            self.stt
                .create_stt(config)
                .await
                .map_err(|e| ParleyError::capability(Capability::Stt, e))
        };
        let llm = async {
            self.llm
                .create_llm(config)
                .await
                .map_err(|e| ParleyError::capability(Capability::Llm, e))
        };
        let tts = async {
            self.tts
                .create_tts(config)
                .await
                .map_err(|e| ParleyError::capability(Capability::Tts, e))
        };

        match tokio::try_join!(vad, stt, llm, tts) {
            Ok((vad, stt, llm, tts)) => {
                debug!(
                    vad = vad.provider(),
                    stt = stt.provider(),
                    llm = llm.provider(),
                    tts = tts.provider(),
                    "Capabilities assembled"
                );
                Ok(Capabilities { vad, stt, llm, tts })
            }
            Err(e) => {
                warn!("Capability assembly failed: {}", e);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}
