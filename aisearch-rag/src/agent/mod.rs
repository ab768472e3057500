//! Agents: LLM loops that answer by calling tools.

pub mod function_calling;
pub mod react;

pub use function_calling::FunctionCallingAgent;
pub use react::{ReActAgent, ToolSource, parse_react_output};

use crate::tools::{Tool, ToolOutput, input_from_args};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One step of a ReAct trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningStep {
    Action {
        thought: String,
        action: String,
        action_input: serde_json::Value,
    },
    Observation {
        observation: String,
    },
    Response {
        thought: String,
        response: String,
    },
}

impl ReasoningStep {
    /// The step as it appears in the conversation.
    pub fn content(&self) -> String {
        match self {
            ReasoningStep::Action {
                thought,
                action,
                action_input,
            } => format!(
                "Thought: {}\nAction: {}\nAction Input: {}",
                thought, action, action_input
            ),
            ReasoningStep::Observation { observation } => format!("Observation: {}", observation),
            ReasoningStep::Response { thought, response } => {
                format!("Thought: {}\nAnswer: {}", thought, response)
            }
        }
    }
}

/// Run the tool called `name` from `tools`. Unknown tools and tool failures
/// become error outputs the model can read.
pub(crate) async fn call_tool(
    tools: &[Arc<dyn Tool>],
    name: &str,
    args: &serde_json::Value,
) -> ToolOutput {
    let input = input_from_args(args);
    let Some(tool) = tools.iter().find(|t| t.name() == name) else {
        warn!(tool = name, "Model called an unknown tool");
        return ToolOutput::error(name, &input, format!("Error: No such tool named `{}`.", name));
    };
    info!(tool = name, input = %input, "Calling tool");
    match tool.call(&input).await {
        Ok(output) => {
            info!(tool = name, output = %output.content, "Tool returned");
            output
        }
        Err(e) => {
            warn!(tool = name, error = %e, "Tool failed");
            ToolOutput::error(name, &input, format!("Error: {}", e))
        }
    }
}
