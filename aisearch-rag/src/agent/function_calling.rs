//! Agent driven by the model's native function calling.

use super::call_tool;
use crate::error::{RagError, Result};
use crate::query_engine::QueryEngine;
use crate::response::Response;
use crate::schema::NodeWithScore;
use crate::tools::{Tool, ToolOutput};
use aisearch_core::{Brain, Message, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_MAX_FUNCTION_CALLS: usize = 5;

pub struct FunctionCallingAgent {
    brain: Brain,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: Option<String>,
    max_function_calls: usize,
    history: Mutex<Vec<Message>>,
}

impl FunctionCallingAgent {
    pub fn new(brain: Brain, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            brain,
            tools,
            system_prompt: None,
            max_function_calls: DEFAULT_MAX_FUNCTION_CALLS,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_function_calls(mut self, max: usize) -> Self {
        self.max_function_calls = max;
        self
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Forget the conversation so far.
    pub async fn reset(&self) {
        self.history.lock().await.clear();
    }

    pub async fn chat_history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| t.metadata().to_definition())
            .collect()
    }

    /// Answer `message`, calling tools until the model replies with text.
    pub async fn chat(&self, message: &str) -> Result<Response> {
        let mut history = self.history.lock().await;
        let mut conversation: Vec<Message> = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            conversation.push(Message::system(prompt.clone()));
        }
        conversation.extend(history.iter().cloned());
        let turn_start = conversation.len();
        conversation.push(Message::user(message));

        let definitions = self.definitions();
        let mut outputs: Vec<ToolOutput> = Vec::new();
        let mut calls = 0usize;

        let answer = loop {
            let response = self
                .brain
                .chat(conversation.clone(), Some(definitions.clone()))
                .await?;
            let requested: Vec<(String, String, serde_json::Value)> = response
                .message
                .content
                .tool_calls()
                .iter()
                .map(|c| (c.id.clone(), c.name.clone(), c.arguments.clone()))
                .collect();

            if requested.is_empty() {
                let text = response.message.content.text().to_string();
                conversation.push(response.message);
                break text;
            }

            conversation.push(response.message);
            for (id, name, args) in requested {
                calls += 1;
                if calls > self.max_function_calls {
                    return Err(RagError::agent(format!(
                        "exceeded {} function calls",
                        self.max_function_calls
                    )));
                }
                debug!(call = calls, tool = %name, "Function call");
                let output = call_tool(&self.tools, &name, &args).await;
                conversation.push(Message::tool_result(id, output.content.clone(), output.is_error));
                outputs.push(output);
            }
        };

        history.extend(conversation.drain(turn_start..));
        info!(tool_calls = calls, "Agent answered");

        let source_nodes: Vec<NodeWithScore> = outputs
            .iter()
            .flat_map(|o| o.source_nodes.iter().cloned())
            .collect();
        let mut response = Response::new(answer, source_nodes);
        response
            .metadata
            .insert("tool_outputs".into(), serde_json::to_value(&outputs)?);
        Ok(response)
    }
}

#[async_trait]
impl QueryEngine for FunctionCallingAgent {
    async fn query(&self, query: &str) -> Result<Response> {
        self.chat(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::QueryEngineTool;
    use aisearch_core::{Content, MockLlmProvider, Role};
    use serde_json::json;

    struct Facts;

    #[async_trait]
    impl QueryEngine for Facts {
        async fn query(&self, query: &str) -> Result<Response> {
            Ok(Response::new(format!("fact about {}", query), Vec::new()))
        }
    }

    fn agent(provider: Arc<MockLlmProvider>) -> FunctionCallingAgent {
        FunctionCallingAgent::new(
            Brain::new(provider),
            vec![Arc::new(QueryEngineTool::from_defaults(
                Arc::new(Facts),
                "vector_tool_agents",
                "Useful for questions related to specific facts",
            ))],
        )
        .with_system_prompt("You are a specialized agent.")
    }

    #[tokio::test]
    async fn test_calls_tool_then_answers() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::tool_call_response(
            "vector_tool_agents",
            json!({"input": "tools"}),
        ));
        provider.queue_text("Agents use tools.");
        let agent = agent(provider.clone());

        let response = agent.query("How do agents work?").await.unwrap();
        assert_eq!(response.response, "Agents use tools.");

        let second = &provider.requests()[1];
        assert_eq!(second.messages[0].role, Role::System);
        let last = second.messages.last().unwrap();
        assert!(matches!(
            &last.content,
            Content::ToolResult { output, is_error: false, .. } if output == "fact about tools"
        ));
        assert!(second.tools.as_ref().is_some_and(|t| t[0].name == "vector_tool_agents"));
        assert_eq!(agent.chat_history().await.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::tool_call_response("nope", json!({"input": "x"})));
        provider.queue_text("done");
        agent(provider.clone()).query("q").await.unwrap();

        let last = provider.requests()[1].messages.last().cloned().unwrap();
        assert!(matches!(
            last.content,
            Content::ToolResult { is_error: true, ref output, .. } if output.contains("No such tool")
        ));
    }

    #[tokio::test]
    async fn test_function_call_limit() {
        let provider = Arc::new(MockLlmProvider::new());
        for _ in 0..3 {
            provider.queue_response(MockLlmProvider::tool_call_response(
                "vector_tool_agents",
                json!({"input": "again"}),
            ));
        }
        let err = agent(provider)
            .with_max_function_calls(2)
            .query("loop forever")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Agent(_)));
    }

    #[tokio::test]
    async fn test_history_carries_over() {
        let provider = Arc::new(MockLlmProvider::with_response("hi"));
        let agent = agent(provider.clone());
        agent.query("first").await.unwrap();
        agent.query("second").await.unwrap();
        // system + first user + first answer + second user
        assert_eq!(provider.requests()[1].messages.len(), 4);
        agent.reset().await;
        assert!(agent.chat_history().await.is_empty());
    }
}
