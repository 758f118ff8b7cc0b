//! Conversation context handed to the assistant session
//!
//! The context starts with a single system message. The session appends user
//! and assistant turns as the conversation proceeds; appended messages are never
//! edited, and the system message is never dropped, even when the history is
//! trimmed to fit a token budget.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Context shared between the job that creates it and the session that extends it
pub type SharedContext = Arc<RwLock<ConversationContext>>;

/// Role of a message in the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

impl MessageRole {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A single message in the conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Role of the message sender
    pub role: MessageRole,

    /// Message text
    pub content: String,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Estimated token count for this message
    pub token_estimate: usize,
}

impl ConversationMessage {
    /// Create a new conversation message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_estimate = estimate_tokens(&content);

        Self {
            role,
            content,
            timestamp: Utc::now(),
            token_estimate,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Ordered, append-only conversation history
#[derive(Clone, Debug)]
pub struct ConversationContext {
    /// All messages; index 0 is the system message when one was given
    messages: Vec<ConversationMessage>,

    /// Whether `messages[0]` is the pinned system message
    has_system: bool,

    /// Token budget for the whole context, if any
    max_tokens: Option<usize>,

    /// Running token total
    current_tokens: usize,
}

impl ConversationContext {
    /// Create an empty context with no system message
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            has_system: false,
            max_tokens: None,
            current_tokens: 0,
        }
    }

    /// Create a context seeded with a system instruction
    pub fn with_system(instructions: impl Into<String>) -> Self {
        let system = ConversationMessage::system(instructions);
        Self {
            current_tokens: system.token_estimate,
            messages: vec![system],
            has_system: true,
            max_tokens: None,
        }
    }

    /// Bound the context to a token budget
    ///
    /// The oldest non-system messages are dropped once the budget is exceeded.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self.trim_to_fit();
        self
    }

    /// Wrap the context for sharing with a session
    pub fn into_shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    /// The pinned system message, if any
    pub fn system_message(&self) -> Option<&ConversationMessage> {
        if self.has_system {
            self.messages.first()
        } else {
            None
        }
    }

    /// Add a user message to the conversation
    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(ConversationMessage::user(content));
    }

    /// Add an assistant message to the conversation
    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(ConversationMessage::assistant(content));
    }

    fn push(&mut self, message: ConversationMessage) {
        self.current_tokens += message.token_estimate;
        self.messages.push(message);
        self.trim_to_fit();
    }

    /// All messages in conversation order, system message first
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Messages after the system message
    pub fn history(&self) -> &[ConversationMessage] {
        let start = usize::from(self.has_system);
        &self.messages[start..]
    }

    /// Get the last user message
    pub fn last_user_message(&self) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::User)
    }

    /// Get the last assistant message
    pub fn last_assistant_message(&self) -> Option<&ConversationMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    /// Number of messages, including the system message
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get estimated total token count
    pub fn total_tokens(&self) -> usize {
        self.current_tokens
    }

    fn trim_to_fit(&mut self) {
        let Some(max_tokens) = self.max_tokens else {
            return;
        };
        let first_removable = usize::from(self.has_system);

        while self.current_tokens > max_tokens && self.messages.len() > first_removable {
            let removed = self.messages.remove(first_removable);
            self.current_tokens = self.current_tokens.saturating_sub(removed.token_estimate);
        }
    }

    /// Export conversation to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.messages)
    }
}

/// Estimate token count for a string
///
/// Uses a simple heuristic: ~4 characters per token for English text.
fn estimate_tokens(text: &str) -> usize {
    let char_estimate = (text.len() + 3) / 4;
    let word_estimate = text.split_whitespace().count();

    char_estimate.max(word_estimate).max(1)
}
