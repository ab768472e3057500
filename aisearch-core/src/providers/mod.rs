//! LLM provider implementations and construction from configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatibleProvider;

use crate::brain::{Brain, LlmProvider};
use crate::callbacks::TokenCountingHandler;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;
use tracing::info;

/// Create an LLM provider from configuration.
///
/// Every supported backend speaks the OpenAI chat-completions dialect, so the
/// `provider` field only selects defaults for the base URL.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let mut config = config.clone();
    if config.base_url.is_none() {
        config.base_url = match config.provider.as_str() {
            "ollama" => Some("http://localhost:11434/v1".to_string()),
            "lmstudio" => Some("http://localhost:1234/v1".to_string()),
            _ => None,
        };
    }
    let provider = OpenAiCompatibleProvider::new(&config)?;
    info!(
        provider = %config.provider,
        model = %config.model,
        "Initialized LLM provider"
    );
    Ok(Arc::new(provider))
}

/// Create a `Brain` from configuration, wired to the shared token counter.
pub fn create_brain(
    config: &LlmConfig,
    callbacks: Arc<TokenCountingHandler>,
) -> Result<Brain, LlmError> {
    let provider = create_provider(config)?;
    Ok(Brain::new(provider)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_callbacks(callbacks))
}
