//! Standard provider line-up: Silero VAD, Deepgram STT, OpenAI LLM and TTS
//!
//! These factories check that the provider's credentials are configured and
//! resolve model settings into descriptor handles. The engines behind them
//! run remotely (or inside the session) and are out of this crate's hands.

use super::{
    LanguageModel, LlmProvider, SpeechToText, SttProvider, TextToSpeech, TtsProvider, VadProvider,
    VoiceActivityDetector,
};
use crate::config::AgentConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use tracing::debug;

/// Silero voice activity detection, runs locally and needs no key
#[derive(Clone, Copy, Debug, Default)]
pub struct SileroVadProvider;

#[derive(Debug)]
pub struct SileroVad {
    activation_threshold: f32,
}

impl VoiceActivityDetector for SileroVad {
    fn provider(&self) -> &str {
        "silero"
    }

    fn activation_threshold(&self) -> f32 {
        self.activation_threshold
    }
}

#[async_trait]
impl VadProvider for SileroVadProvider {
    async fn create_vad(
        &self,
        config: &AgentConfig,
    ) -> Result<Box<dyn VoiceActivityDetector>, ProviderError> {
        debug!("Loading Silero VAD (threshold {})", config.vad_threshold);
        Ok(Box::new(SileroVad {
            activation_threshold: config.vad_threshold,
        }))
    }
}

/// Deepgram streaming speech-to-text
#[derive(Clone, Copy, Debug, Default)]
pub struct DeepgramSttProvider;

#[derive(Debug)]
pub struct DeepgramStt {
    model: String,
    language: String,
}

impl SpeechToText for DeepgramStt {
    fn provider(&self) -> &str {
        "deepgram"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn language(&self) -> &str {
        &self.language
    }
}

#[async_trait]
impl SttProvider for DeepgramSttProvider {
    async fn create_stt(&self, config: &AgentConfig) -> Result<Box<dyn SpeechToText>, ProviderError> {
        config.require_deepgram_api_key()?;
        debug!("Creating Deepgram STT client ({})", config.stt_model);
        Ok(Box::new(DeepgramStt {
            model: config.stt_model.clone(),
            language: config.stt_language.clone(),
        }))
    }
}

/// OpenAI chat completions
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiLlmProvider;

#[derive(Debug)]
pub struct OpenAiLlm {
    model: String,
}

impl LanguageModel for OpenAiLlm {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    async fn create_llm(&self, config: &AgentConfig) -> Result<Box<dyn LanguageModel>, ProviderError> {
        config.require_openai_api_key()?;
        debug!("Creating OpenAI LLM client ({})", config.llm_model);
        Ok(Box::new(OpenAiLlm {
            model: config.llm_model.clone(),
        }))
    }
}

/// OpenAI speech synthesis
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiTtsProvider;

#[derive(Debug)]
pub struct OpenAiTts {
    model: String,
    voice: String,
}

impl TextToSpeech for OpenAiTts {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn voice(&self) -> &str {
        &self.voice
    }
}

#[async_trait]
impl TtsProvider for OpenAiTtsProvider {
    async fn create_tts(&self, config: &AgentConfig) -> Result<Box<dyn TextToSpeech>, ProviderError> {
        config.require_openai_api_key()?;
        debug!("Creating OpenAI TTS client ({}, voice {})", config.tts_model, config.tts_voice);
        Ok(Box::new(OpenAiTts {
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
        }))
    }
}
