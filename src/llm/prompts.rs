//! System instructions for the voice assistant

use super::context::ConversationContext;

/// Persona and response-style instruction seeded into every conversation
pub const VOICE_INSTRUCTIONS: &str = "You are a voice assistant created by LiveKit. \
Your interface with users will be voice. You should use short and concise responses, \
and avoiding usage of unpronounceable punctuation.";

/// Build a fresh conversation context for one job
///
/// Each call returns an independent context holding only the system message.
pub fn new_context() -> ConversationContext {
    ConversationContext::with_system(VOICE_INSTRUCTIONS)
}
