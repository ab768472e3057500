//! Tools: named, described callables an agent can invoke with a string input.

use crate::error::Result;
use crate::query_engine::QueryEngine;
use crate::schema::NodeWithScore;
use aisearch_core::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Function-calling schema with a single string `input` argument.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "The question or instruction to pass to the tool."
                    }
                },
                "required": ["input"]
            }),
        }
    }
}

/// What a tool call produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub raw_input: serde_json::Value,
    pub content: String,
    pub is_error: bool,
    /// Nodes behind the answer when the tool wraps a query engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_nodes: Vec<NodeWithScore>,
}

impl ToolOutput {
    pub fn error(tool_name: impl Into<String>, input: &str, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            raw_input: serde_json::json!({ "input": input }),
            content: message.into(),
            is_error: true,
            source_nodes: Vec::new(),
        }
    }
}

impl std::fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    async fn call(&self, input: &str) -> Result<ToolOutput>;

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// The string input carried by tool-call arguments: `{"input": "..."}`, a
/// bare string, or any other JSON rendered as text.
pub fn input_from_args(args: &serde_json::Value) -> String {
    match args {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => match map.get("input") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None if map.len() == 1 => map
                .values()
                .next()
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| args.to_string()),
            None => args.to_string(),
        },
        other => other.to_string(),
    }
}

/// Exposes a query engine (or an agent) as a tool.
pub struct QueryEngineTool {
    engine: Arc<dyn QueryEngine>,
    metadata: ToolMetadata,
}

impl QueryEngineTool {
    pub fn new(engine: Arc<dyn QueryEngine>, metadata: ToolMetadata) -> Self {
        Self { engine, metadata }
    }

    pub fn from_defaults(
        engine: Arc<dyn QueryEngine>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(engine, ToolMetadata::new(name, description))
    }

    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }
}

#[async_trait]
impl Tool for QueryEngineTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        debug!(tool = %self.metadata.name, input, "Calling query engine tool");
        let response = self.engine.query(input).await?;
        Ok(ToolOutput {
            tool_name: self.metadata.name.clone(),
            raw_input: serde_json::json!({ "input": input }),
            content: response.response,
            is_error: false,
            source_nodes: response.source_nodes,
        })
    }
}
