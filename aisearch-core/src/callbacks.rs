//! Token accounting shared across a pipeline run.
//!
//! A single `TokenCountingHandler` is handed to the `Brain` and to the
//! embedder wrapper so that every LLM and embedding call made while building
//! indexes, answering questions and evaluating answers is counted in one place.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of the counters held by a [`TokenCountingHandler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub embedding_tokens: usize,
    pub llm_calls: usize,
    pub embedding_calls: usize,
}

impl TokenTotals {
    pub fn total_llm_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Thread-safe token counter.
#[derive(Debug, Default)]
pub struct TokenCountingHandler {
    prompt_tokens: AtomicUsize,
    completion_tokens: AtomicUsize,
    embedding_tokens: AtomicUsize,
    llm_calls: AtomicUsize,
    embedding_calls: AtomicUsize,
}

impl TokenCountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished LLM call.
    pub fn on_llm_end(&self, prompt_tokens: usize, completion_tokens: usize) {
        self.prompt_tokens
            .fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion_tokens, Ordering::Relaxed);
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one embedding request covering `tokens` input tokens.
    pub fn on_embedding(&self, tokens: usize) {
        self.embedding_tokens.fetch_add(tokens, Ordering::Relaxed);
        self.embedding_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn prompt_tokens(&self) -> usize {
        self.prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn completion_tokens(&self) -> usize {
        self.completion_tokens.load(Ordering::Relaxed)
    }

    pub fn embedding_tokens(&self) -> usize {
        self.embedding_tokens.load(Ordering::Relaxed)
    }

    pub fn totals(&self) -> TokenTotals {
        TokenTotals {
            prompt_tokens: self.prompt_tokens(),
            completion_tokens: self.completion_tokens(),
            embedding_tokens: self.embedding_tokens(),
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            embedding_calls: self.embedding_calls.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
        self.embedding_tokens.store(0, Ordering::Relaxed);
        self.llm_calls.store(0, Ordering::Relaxed);
        self.embedding_calls.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_accumulate() {
        let handler = TokenCountingHandler::new();
        handler.on_llm_end(100, 20);
        handler.on_llm_end(50, 10);
        handler.on_embedding(42);

        let totals = handler.totals();
        assert_eq!(totals.prompt_tokens, 150);
        assert_eq!(totals.completion_tokens, 30);
        assert_eq!(totals.total_llm_tokens(), 180);
        assert_eq!(totals.embedding_tokens, 42);
        assert_eq!(totals.llm_calls, 2);
        assert_eq!(totals.embedding_calls, 1);
    }

    #[test]
    fn test_reset() {
        let handler = TokenCountingHandler::new();
        handler.on_llm_end(1, 1);
        handler.reset();
        assert_eq!(handler.totals(), TokenTotals::default());
    }

    #[tokio::test]
    async fn test_shared_across_tasks() {
        let handler = Arc::new(TokenCountingHandler::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let h = handler.clone();
            handles.push(tokio::spawn(async move { h.on_llm_end(10, 1) }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(handler.prompt_tokens(), 80);
        assert_eq!(handler.totals().llm_calls, 8);
    }
}
