//! Token estimation.
//!
//! Uses a character-based heuristic: ~4 characters per token. Budget
//! checks only need an order of magnitude, so no tokenizer is loaded.

use keel_core::message::Message;

/// Estimated token count of a conversation, rounded up.
///
/// Counts message content plus serialized tool-call input.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(Message::text_chars).sum();
    chars.div_ceil(4)
}
