//! Conversation state for the language-model capability
//!
//! - **context**: ordered, append-only conversation history
//! - **prompts**: the fixed voice-assistant instruction and context builder

pub mod context;
pub mod prompts;

pub use context::{ConversationContext, ConversationMessage, MessageRole, SharedContext};
pub use prompts::{new_context, VOICE_INSTRUCTIONS};
