//! Brain module: LLM provider abstraction and interaction.
//!
//! Defines the `LlmProvider` trait for model-agnostic LLM interactions and the
//! `Brain` wrapper that pipelines, evaluators and agents call through. The
//! brain applies the configured sampling settings, fills in token usage when a
//! provider does not report it, and feeds the shared token counter.

use crate::callbacks::TokenCountingHandler;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolCall,
    ToolDefinition,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the context window size for this provider/model.
    fn context_window(&self) -> usize;

    /// Return whether this provider supports tool/function calling.
    fn supports_tools(&self) -> bool;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Token counter using tiktoken-rs for BPE tokenization.
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Create a token counter for the given model.
    /// Falls back to cl100k_base if the model isn't recognized.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model).unwrap_or_else(|_| {
            tiktoken_rs::cl100k_base().expect("cl100k_base should be available")
        });
        Self { bpe }
    }

    /// Count the number of tokens in a string.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Estimate the token count for a set of messages.
    /// Adds overhead for message structure (role, separators).
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        let mut total = 0;
        for msg in messages {
            total += 4;
            total += match &msg.content {
                Content::Text { text } => self.count(text),
                Content::ToolCalls { text, calls } => {
                    self.count(text.as_deref().unwrap_or(""))
                        + calls
                            .iter()
                            .map(|c| self.count(&c.name) + self.count(&c.arguments.to_string()))
                            .sum::<usize>()
                }
                other => self.count(other.text()),
            };
        }
        total + 3
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}

/// High-level handle used by everything that talks to an LLM.
#[derive(Clone)]
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
    model: Option<String>,
    token_counter: Arc<TokenCounter>,
    callbacks: Option<Arc<TokenCountingHandler>>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let token_counter = Arc::new(TokenCounter::for_model(provider.model_name()));
        Self {
            provider,
            temperature: 0.0,
            max_tokens: None,
            model: None,
            token_counter,
            callbacks: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the model sent with every request (same provider, same key).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<TokenCountingHandler>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.model_name())
    }

    pub fn context_window(&self) -> usize {
        self.provider.context_window()
    }

    pub fn supports_tools(&self) -> bool {
        self.provider.supports_tools()
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.token_counter.count(text)
    }

    pub fn token_counter(&self) -> &Arc<TokenCounter> {
        &self.token_counter
    }

    /// Send a single user prompt and return the text of the answer.
    pub async fn predict(&self, prompt: &str) -> Result<String, LlmError> {
        self.predict_messages(vec![Message::user(prompt)]).await
    }

    /// Send a conversation without tools and return the text of the answer.
    pub async fn predict_messages(&self, messages: Vec<Message>) -> Result<String, LlmError> {
        let response = self.chat(messages, None).await?;
        Ok(response.message.content.text().trim().to_string())
    }

    /// Send a conversation, optionally offering tools.
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, LlmError> {
        let prompt_estimate = self.token_counter.count_messages(&messages);
        let request = CompletionRequest {
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: self.model.clone(),
        };

        debug!(
            model = %self.model_name(),
            prompt_tokens = prompt_estimate,
            "Sending completion request"
        );
        let mut response = self.provider.complete(request).await?;

        if response.usage == TokenUsage::default() {
            response.usage = TokenUsage {
                input_tokens: prompt_estimate,
                output_tokens: self
                    .token_counter
                    .count(response.message.content.text()),
            };
        }
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_llm_end(response.usage.input_tokens, response.usage.output_tokens);
        }
        Ok(response)
    }
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("model", &self.model_name())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// A mock LLM provider for testing.
///
/// Returns queued responses in FIFO order and records every request it sees.
pub struct MockLlmProvider {
    model: String,
    context_window: usize,
    default_reply: String,
    responses: Mutex<VecDeque<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            context_window: 4096,
            default_reply: "I'm a mock LLM. No queued responses available.".to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers every request with the given text.
    pub fn with_response(text: &str) -> Self {
        let mut provider = Self::new();
        provider.default_reply = text.to_string();
        provider
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses
            .lock()
            .expect("mock response queue poisoned")
            .push_back(response);
    }

    /// Queue a plain text answer.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
        }
    }

    /// Create a tool call response for testing.
    pub fn tool_call_response(tool_name: &str, arguments: serde_json::Value) -> CompletionResponse {
        let call = ToolCall {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: tool_name.to_string(),
            arguments,
        };
        CompletionResponse {
            message: Message::tool_calls(None, vec![call]),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .len()
    }

    /// Text of the last user message of the `index`-th request.
    pub fn prompt_at(&self, index: usize) -> Option<String> {
        let requests = self.requests.lock().expect("mock request log poisoned");
        requests.get(index).and_then(|r| {
            r.messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.text().to_string())
        })
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(request);
        let queued = self
            .responses
            .lock()
            .expect("mock response queue poisoned")
            .pop_front();
        Ok(queued.unwrap_or_else(|| MockLlmProvider::text_response(&self.default_reply)))
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_counter_counts() {
        let counter = TokenCounter::for_model("gpt-3.5-turbo");
        assert_eq!(counter.count(""), 0);
        assert!(counter.count("hello world") >= 2);
    }

    #[test]
    fn test_token_counter_unknown_model_falls_back() {
        let counter = TokenCounter::for_model("definitely-not-a-model");
        assert!(counter.count("fallback works") > 0);
    }

    #[test]
    fn test_count_messages_overhead() {
        let counter = TokenCounter::for_model("gpt-3.5-turbo");
        let messages = vec![Message::user("")];
        assert_eq!(counter.count_messages(&messages), 7);
    }

    #[tokio::test]
    async fn test_mock_fifo_then_default() {
        let provider = MockLlmProvider::with_response("fallback");
        provider.queue_text("first");
        provider.queue_text("second");
        let brain = Brain::new(Arc::new(provider));

        assert_eq!(brain.predict("a").await.unwrap(), "first");
        assert_eq!(brain.predict("b").await.unwrap(), "second");
        assert_eq!(brain.predict("c").await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = Arc::new(MockLlmProvider::new());
        let brain = Brain::new(provider.clone()).with_model("gpt-4-turbo");
        brain.predict("What did the author do?").await.unwrap();

        assert_eq!(provider.request_count(), 1);
        assert_eq!(
            provider.prompt_at(0).as_deref(),
            Some("What did the author do?")
        );
        assert_eq!(provider.requests()[0].model.as_deref(), Some("gpt-4-turbo"));
        assert_eq!(brain.model_name(), "gpt-4-turbo");
    }

    #[tokio::test]
    async fn test_brain_feeds_callbacks() {
        let handler = Arc::new(TokenCountingHandler::new());
        let brain = Brain::new(Arc::new(MockLlmProvider::with_response("ok")))
            .with_callbacks(handler.clone());
        brain.predict("one").await.unwrap();
        brain.predict("two").await.unwrap();

        let totals = handler.totals();
        assert_eq!(totals.llm_calls, 2);
        assert_eq!(totals.prompt_tokens, 200);
        assert_eq!(totals.completion_tokens, 100);
    }

    #[tokio::test]
    async fn test_brain_estimates_missing_usage() {
        let provider = MockLlmProvider::new();
        let mut response = MockLlmProvider::text_response("four tokens or so");
        response.usage = TokenUsage::default();
        provider.queue_response(response);

        let handler = Arc::new(TokenCountingHandler::new());
        let brain = Brain::new(Arc::new(provider)).with_callbacks(handler.clone());
        brain.predict("estimate me").await.unwrap();

        assert!(handler.prompt_tokens() > 0);
        assert!(handler.completion_tokens() > 0);
    }

    #[tokio::test]
    async fn test_brain_passes_temperature() {
        let provider = Arc::new(MockLlmProvider::new());
        let brain = Brain::new(provider.clone())
            .with_temperature(0.1)
            .with_max_tokens(Some(512));
        brain.predict("x").await.unwrap();
        let request = &provider.requests()[0];
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, Some(512));
    }
}
