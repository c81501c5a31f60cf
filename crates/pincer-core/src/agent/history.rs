//! Conversation history primitives and token counting.
//!
//! History is an ordered sequence of role-tagged messages with a single
//! logical owner (the outer agent loop). The only operation that is not an
//! append is compression, which replaces the whole vector with the value
//! returned by [`ContextCompressor::maybe_compress`](super::compressor::ContextCompressor::maybe_compress).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Deterministic token counter.
///
/// Budget decisions must be made on real token counts; implementations may
/// not approximate by character count.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;

    /// Total tokens over a slice of messages.
    fn count_history(&self, history: &[ChatMessage]) -> usize {
        history.iter().map(|m| self.count_tokens(&m.content)).sum()
    }
}

/// BPE token counter backed by tiktoken.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenTokenizer {
    /// Counter for the given model, falling back to `cl100k_base` when the
    /// model is not recognized.
    pub fn for_model(model: &str) -> Result<Self, CoreError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base()
                .map_err(|e| CoreError::Tokenizer(e.to_string()))?,
        };
        Ok(Self { bpe })
    }

    pub fn cl100k() -> Result<Self, CoreError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiktoken_counts_are_deterministic() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "fn main() { println!(\"hello\"); }";
        let first = tokenizer.count_tokens(text);
        let second = tokenizer.count_tokens(text);
        assert_eq!(first, second);
        assert!(first > 0);
    }

    #[test]
    fn count_history_sums_message_contents() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let history = vec![
            ChatMessage::user("one two three"),
            ChatMessage::assistant("four five"),
        ];
        let total = tokenizer.count_history(&history);
        let by_hand = tokenizer.count_tokens("one two three") + tokenizer.count_tokens("four five");
        assert_eq!(total, by_hand);
    }

    #[test]
    fn unknown_model_falls_back() {
        let tokenizer = TiktokenTokenizer::for_model("not-a-real-model").unwrap();
        assert!(tokenizer.count_tokens("hello world") > 0);
    }

    #[test]
    fn message_roundtrips_through_serde() {
        let msg = ChatMessage::assistant("done");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"assistant\""));
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
