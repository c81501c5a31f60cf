//! Token-budget governor over the conversation history.
//!
//! The compressor never mutates history in place: the caller owns the
//! vector and replaces it wholesale with the returned value. Compression
//! summarizes the older prefix and leaves the most recent messages verbatim;
//! the advisory (non-forced) path is throttled by a minimum interval and
//! consults the summarization collaborator before acting.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::event_bus::EventBus;
use super::events::EventPayload;
use super::history::{ChatMessage, Tokenizer};

/// Summarization collaborator: advises on, and performs, compression.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Whether compressing now is advisable given the current size.
    async fn should_compress(&self, token_count: usize, history: &[ChatMessage]) -> bool;

    /// Summarize the given messages into a smaller sequence.
    async fn compress(&self, head: &[ChatMessage]) -> anyhow::Result<Vec<ChatMessage>>;
}

/// Policy constants for compression decisions.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Token budget for the conversation.
    pub max_tokens: usize,
    /// Most recent messages always preserved verbatim.
    pub preserve_recent: usize,
    /// Fraction of the budget at which compression becomes advisable.
    pub intelligent_threshold: f64,
    /// Fraction of the budget at which compression is unconditional.
    pub force_threshold: f64,
    /// Minimum interval between advisory compressions.
    pub min_interval: std::time::Duration,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            preserve_recent: 10,
            intelligent_threshold: 0.8,
            force_threshold: 0.95,
            min_interval: std::time::Duration::from_secs(60),
        }
    }
}

/// Decides when and how to shrink the conversation history.
pub struct ContextCompressor {
    config: CompressionConfig,
    tokenizer: Arc<dyn Tokenizer>,
    summarizer: Arc<dyn Summarizer>,
    bus: Arc<EventBus>,
    last_compression: Mutex<Option<Instant>>,
}

impl ContextCompressor {
    pub fn new(
        config: CompressionConfig,
        tokenizer: Arc<dyn Tokenizer>,
        summarizer: Arc<dyn Summarizer>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            tokenizer,
            summarizer,
            bus,
            last_compression: Mutex::new(None),
        }
    }

    /// Inspect the history and compress it if thresholds are crossed.
    ///
    /// Returns the input unchanged when nothing is eligible; otherwise the
    /// older prefix is replaced by its summary and the last
    /// `preserve_recent` messages are carried over untouched.
    pub async fn maybe_compress(&self, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if history.len() <= self.config.preserve_recent {
            return history;
        }

        let token_count = self.tokenizer.count_history(&history);
        let budget = self.config.max_tokens as f64;
        let force_at = budget * self.config.force_threshold;
        let advise_at = budget * self.config.intelligent_threshold;

        if token_count as f64 > force_at {
            tracing::info!(
                token_count,
                threshold = force_at as usize,
                "force threshold crossed, compressing unconditionally"
            );
            return self.compress(history, token_count).await;
        }

        if token_count as f64 > advise_at {
            if self.throttled() {
                tracing::debug!(token_count, "compression throttled by minimum interval");
                return history;
            }
            if self
                .summarizer
                .should_compress(token_count, &history)
                .await
            {
                return self.compress(history, token_count).await;
            }
        }

        history
    }

    fn throttled(&self) -> bool {
        match *self.last_compression.lock() {
            Some(at) => at.elapsed() < self.config.min_interval,
            None => false,
        }
    }

    async fn compress(&self, mut history: Vec<ChatMessage>, token_count: usize) -> Vec<ChatMessage> {
        let split_at = history.len() - self.config.preserve_recent;
        let tail = history.split_off(split_at);
        let head = history;

        let summarized = match self.summarizer.compress(&head).await {
            Ok(summarized) if summarized.len() < head.len() => summarized,
            Ok(summarized) => {
                tracing::warn!(
                    head_len = head.len(),
                    summary_len = summarized.len(),
                    "summary did not shrink the prefix, keeping original history"
                );
                return rejoin(head, tail);
            }
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, keeping original history");
                return rejoin(head, tail);
            }
        };

        *self.last_compression.lock() = Some(Instant::now());

        let compressed = rejoin(summarized, tail);
        self.bus.emit(EventPayload::SystemInfo {
            message: format!(
                "Compressed conversation history: {} messages ({} tokens) -> {} messages",
                split_at + self.config.preserve_recent,
                token_count,
                compressed.len(),
            ),
        });

        compressed
    }
}

fn rejoin(mut head: Vec<ChatMessage>, tail: Vec<ChatMessage>) -> Vec<ChatMessage> {
    head.extend(tail);
    head
}
