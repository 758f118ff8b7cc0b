//! Fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use parley::capabilities::{
    LanguageModel, LlmProvider, SpeechToText, SttProvider, TextToSpeech, TtsProvider, VadProvider,
    VoiceActivityDetector,
};
use parley::llm::SharedContext;
use parley::{
    Agent, AgentConfig, AssistantSession, AutoSubscribe, Capabilities, Capability, ConnectedRoom,
    ConnectionError, GreetingOutcome, JobHandle, JobObserver, JobOptions, JobState, ProviderError,
    ProviderSet, Readiness, RoomConnector, SessionError, SessionFactory,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const GREETING: &str = "Hey, how can I help you today?";

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeRoom {
    name: String,
    subscription: AutoSubscribe,
}

impl ConnectedRoom for FakeRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscription(&self) -> AutoSubscribe {
        self.subscription
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub fail_with: Option<ConnectionError>,
    /// Never finish connecting
    pub hang: bool,
    pub subscriptions: Mutex<Vec<AutoSubscribe>>,
}

impl FakeConnector {
    pub fn failing(err: ConnectionError) -> Self {
        Self {
            fail_with: Some(err),
            ..Default::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[async_trait]
impl RoomConnector for FakeConnector {
    async fn connect(
        &self,
        job: &JobHandle,
        subscription: AutoSubscribe,
    ) -> Result<Arc<dyn ConnectedRoom>, ConnectionError> {
        self.subscriptions.lock().push(subscription);
        tokio::task::yield_now().await;
        if self.hang {
            std::future::pending::<()>().await;
        }
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(Arc::new(FakeRoom {
                name: job.room_name.clone(),
                subscription,
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeHandle;

impl VoiceActivityDetector for FakeHandle {
    fn provider(&self) -> &str {
        "fake"
    }

    fn activation_threshold(&self) -> f32 {
        0.5
    }
}

impl SpeechToText for FakeHandle {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-stt"
    }

    fn language(&self) -> &str {
        "en"
    }
}

impl LanguageModel for FakeHandle {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-llm"
    }
}

impl TextToSpeech for FakeHandle {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-tts"
    }

    fn voice(&self) -> &str {
        "fake-voice"
    }
}

/// One fake provider standing in for all four factories
#[derive(Default)]
pub struct FakeProvider {
    pub fail: Option<Capability>,
    pub calls: Mutex<Vec<Capability>>,
}

impl FakeProvider {
    pub fn failing(which: Capability) -> Self {
        Self {
            fail: Some(which),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, which: Capability) -> Result<(), ProviderError> {
        self.calls.lock().push(which);
        if self.fail == Some(which) {
            Err(ProviderError::Backend(format!("{} unavailable", which)))
        } else {
            Ok(())
        }
    }

    pub fn into_set(self: Arc<Self>) -> ProviderSet {
        ProviderSet::new(self.clone(), self.clone(), self.clone(), self)
    }
}

#[async_trait]
impl VadProvider for FakeProvider {
    async fn create_vad(
        &self,
        _config: &AgentConfig,
    ) -> Result<Box<dyn VoiceActivityDetector>, ProviderError> {
        self.record(Capability::Vad)?;
        Ok(Box::new(FakeHandle))
    }
}

#[async_trait]
impl SttProvider for FakeProvider {
    async fn create_stt(&self, _config: &AgentConfig) -> Result<Box<dyn SpeechToText>, ProviderError> {
        self.record(Capability::Stt)?;
        Ok(Box::new(FakeHandle))
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    async fn create_llm(&self, _config: &AgentConfig) -> Result<Box<dyn LanguageModel>, ProviderError> {
        self.record(Capability::Llm)?;
        Ok(Box::new(FakeHandle))
    }
}

#[async_trait]
impl TtsProvider for FakeProvider {
    async fn create_tts(&self, _config: &AgentConfig) -> Result<Box<dyn TextToSpeech>, ProviderError> {
        self.record(Capability::Tts)?;
        Ok(Box::new(FakeHandle))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub enum ReadyBehaviour {
    Unsupported,
    ReadyAfter(Duration),
    Never,
}

/// Everything the fake sessions did, shared with the test
#[derive(Default)]
pub struct SessionLog {
    pub created: AtomicUsize,
    pub started_at: Mutex<Vec<Instant>>,
    pub says: Mutex<Vec<(String, bool, Instant)>>,
    pub contexts: Mutex<Vec<SharedContext>>,
}

impl SessionLog {
    pub fn start_count(&self) -> usize {
        self.started_at.lock().len()
    }

    pub fn say_count(&self) -> usize {
        self.says.lock().len()
    }
}

pub struct FakeSession {
    log: Arc<SessionLog>,
    fail_start: bool,
    fail_say: bool,
    say_hangs: bool,
    ready: ReadyBehaviour,
}

#[async_trait]
impl AssistantSession for FakeSession {
    async fn start(&self, _room: Arc<dyn ConnectedRoom>) -> Result<(), SessionError> {
        if self.fail_start {
            return Err(SessionError::StartFailed("no audio track".to_string()));
        }
        self.log.started_at.lock().push(Instant::now());
        Ok(())
    }

    async fn say(&self, text: &str, allow_interruptions: bool) -> Result<(), SessionError> {
        self.log
            .says
            .lock()
            .push((text.to_string(), allow_interruptions, Instant::now()));
        if self.say_hangs {
            std::future::pending::<()>().await;
        }
        if self.fail_say {
            Err(SessionError::SayFailed("tts unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn wait_ready(&self) -> Readiness {
        match self.ready {
            ReadyBehaviour::Unsupported => Readiness::Unsupported,
            ReadyBehaviour::ReadyAfter(after) => {
                tokio::time::sleep(after).await;
                Readiness::Ready
            }
            ReadyBehaviour::Never => std::future::pending().await,
        }
    }
}

pub struct FakeSessionFactory {
    pub log: Arc<SessionLog>,
    pub fail_start: bool,
    pub fail_say: bool,
    /// `say` never returns, even when the job is cancelled
    pub say_hangs: bool,
    pub ready: ReadyBehaviour,
}

impl Default for FakeSessionFactory {
    fn default() -> Self {
        Self {
            log: Arc::new(SessionLog::default()),
            fail_start: false,
            fail_say: false,
            say_hangs: false,
            ready: ReadyBehaviour::Unsupported,
        }
    }
}

impl SessionFactory for FakeSessionFactory {
    fn create(
        &self,
        _capabilities: Capabilities,
        context: SharedContext,
    ) -> Result<Box<dyn AssistantSession>, SessionError> {
        self.log.created.fetch_add(1, Ordering::SeqCst);
        self.log.contexts.lock().push(context);
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            fail_start: self.fail_start,
            fail_say: self.fail_say,
            say_hangs: self.say_hangs,
            ready: self.ready,
        }))
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<(JobState, JobState)>>,
    pub greetings: Mutex<Vec<GreetingOutcome>>,
    pub ticks: AtomicU64,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<JobState> {
        self.transitions.lock().iter().map(|(_, to)| *to).collect()
    }

    pub fn current(&self) -> JobState {
        self.transitions
            .lock()
            .last()
            .map(|(_, to)| *to)
            .unwrap_or(JobState::Created)
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl JobObserver for RecordingObserver {
    fn on_transition(&self, _job: &JobHandle, from: JobState, to: JobState) {
        self.transitions.lock().push((from, to));
    }

    fn on_greeting(&self, _job: &JobHandle, outcome: &GreetingOutcome) {
        self.greetings.lock().push(outcome.clone());
    }

    fn on_idle_tick(&self, _job: &JobHandle, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn test_options() -> JobOptions {
    JobOptions::default()
        .with_greeting_delay(Duration::from_secs(1))
        .with_idle_tick(Duration::from_secs(1))
        .with_readiness_timeout(Duration::from_secs(5))
}

pub fn agent(
    connector: Arc<FakeConnector>,
    providers: Arc<FakeProvider>,
    sessions: Arc<FakeSessionFactory>,
) -> Agent {
    Agent::new(connector, providers.into_set(), sessions, test_options())
}

/// Sleep in small steps until `cond` holds; panics after `limit` of runtime time
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
