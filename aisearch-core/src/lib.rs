//! # aisearch core
//!
//! Core library shared by the aisearch RAG pipelines.
//! Provides the LLM interface (brain), embedding providers, token accounting,
//! configuration, persistence helpers and fundamental message types.

pub mod brain;
pub mod callbacks;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod persistence;
pub mod providers;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider, TokenCounter};
pub use callbacks::{TokenCountingHandler, TokenTotals};
pub use config::{AppConfig, EmbeddingConfig, LlmConfig, load_config};
pub use embeddings::{
    CountingEmbedder, Embedder, LocalEmbedder, OpenAiEmbedder, cosine_similarity, create_embedder,
};
pub use error::{ConfigError, CoreError, EmbeddingError, LlmError, Result};
pub use providers::{create_brain, create_provider};
pub use types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition,
};
