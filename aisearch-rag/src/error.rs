//! Error types for the aisearch-rag crate.

use aisearch_core::error::{EmbeddingError, LlmError};
use thiserror::Error;

/// Top-level error type for RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Reader error: {0}")]
    Reader(String),

    #[error("Graph store error: {0}")]
    GraphStore(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RagError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn reader(msg: impl Into<String>) -> Self {
        Self::Reader(msg.into())
    }

    pub fn graph_store(msg: impl Into<String>) -> Self {
        Self::GraphStore(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            RagError::storage("no docstore.json in /tmp/x").to_string(),
            "Storage error: no docstore.json in /tmp/x"
        );
        assert_eq!(
            RagError::agent("too many tool calls").to_string(),
            "Agent error: too many tool calls"
        );
    }

    #[test]
    fn test_from_llm_error() {
        let err: RagError = LlmError::Timeout { timeout_secs: 30 }.into();
        assert!(matches!(err, RagError::Llm(_)));
        assert!(err.to_string().contains("30s"));
    }
}
