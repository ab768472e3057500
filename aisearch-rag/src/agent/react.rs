//! ReAct agent: the model reasons in `Thought / Action / Action Input`
//! text, tools are run on its behalf, and results come back as
//! `Observation:` messages until it writes an `Answer:`.

use super::{ReasoningStep, call_tool};
use crate::error::{RagError, Result};
use crate::objects::ToolRetriever;
use crate::prompts;
use crate::query_engine::QueryEngine;
use crate::response::Response;
use crate::tools::Tool;
use aisearch_core::{Brain, Message};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Where the agent gets its tools from.
pub enum ToolSource {
    Fixed(Vec<Arc<dyn Tool>>),
    /// Tools retrieved per query.
    Retriever(Arc<dyn ToolRetriever>),
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Thought:\s*(.*?)\s*Action:\s*([A-Za-z0-9_\-]+).*?Action Input:\s*(.*)")
            .expect("valid regex")
    })
}

fn answer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Thought:\s*(.*?)\s*Answer:\s*(.*)")
            .expect("valid regex")
    })
}

/// The JSON object in an action input, tolerating single quotes.
fn parse_action_input(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    let object = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => return serde_json::Value::String(raw.trim_matches('`').trim().to_string()),
    };
    serde_json::from_str(object)
        .or_else(|_| serde_json::from_str(&object.replace('\'', "\"")))
        .unwrap_or_else(|_| serde_json::Value::String(object.to_string()))
}

/// Parse one model turn. Output without a recognisable action is taken as
/// the final answer.
pub fn parse_react_output(output: &str) -> ReasoningStep {
    let output = match output.find("\nObservation:") {
        Some(pos) => &output[..pos],
        None => output,
    }
    .trim();

    if !output.contains("Thought:") {
        return ReasoningStep::Response {
            thought: "(Implicit) I can answer without any more tools!".to_string(),
            response: output.to_string(),
        };
    }
    if output.contains("Action:")
        && let Some(caps) = action_regex().captures(output)
    {
        return ReasoningStep::Action {
            thought: caps[1].trim().to_string(),
            action: caps[2].trim().to_string(),
            action_input: parse_action_input(&caps[3]),
        };
    }
    if let Some(caps) = answer_regex().captures(output) {
        return ReasoningStep::Response {
            thought: caps[1].trim().to_string(),
            response: caps[2].trim().to_string(),
        };
    }
    ReasoningStep::Response {
        thought: "(Implicit) I can answer without any more tools!".to_string(),
        response: output.to_string(),
    }
}

/// Tool listing for the ReAct header.
fn tool_descriptions(tools: &[Arc<dyn Tool>]) -> String {
    tools
        .iter()
        .map(|t| {
            let meta = t.metadata();
            format!(
                "> Tool Name: {}\nTool Description: {}\nTool Args: {}\n",
                meta.name,
                meta.description,
                meta.to_definition().parameters
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ReActAgent {
    brain: Brain,
    tool_source: ToolSource,
    system_prompt: Option<String>,
    max_iterations: usize,
    history: Mutex<Vec<Message>>,
}

impl ReActAgent {
    pub fn new(brain: Brain, tool_source: ToolSource) -> Self {
        Self {
            brain,
            tool_source,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub async fn reset(&self) {
        self.history.lock().await.clear();
    }

    async fn tools_for(&self, query: &str) -> Result<Vec<Arc<dyn Tool>>> {
        match &self.tool_source {
            ToolSource::Fixed(tools) => Ok(tools.clone()),
            ToolSource::Retriever(retriever) => retriever.retrieve_tools(query).await,
        }
    }

    fn header(&self, tools: &[Arc<dyn Tool>]) -> String {
        let names = tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ");
        let header = prompts::render(
            prompts::REACT_HEADER,
            &[("tool_desc", &tool_descriptions(tools)), ("tool_names", &names)],
        );
        match &self.system_prompt {
            Some(prompt) => format!("{}\n\n{}", prompt.trim(), header),
            None => header,
        }
    }

    pub async fn chat(&self, message: &str) -> Result<Response> {
        let tools = self.tools_for(message).await?;
        info!(tools = tools.len(), "ReAct agent tools");
        let mut history = self.history.lock().await;

        let mut base = vec![Message::system(self.header(&tools))];
        base.extend(history.iter().cloned());
        base.push(Message::user(message));

        let mut steps: Vec<ReasoningStep> = Vec::new();
        let mut sources = Vec::new();

        for iteration in 1..=self.max_iterations {
            let mut conversation = base.clone();
            for step in &steps {
                conversation.push(match step {
                    ReasoningStep::Observation { .. } => Message::user(step.content()),
                    _ => Message::assistant(step.content()),
                });
            }
            let output = self.brain.predict_messages(conversation).await?;
            let step = parse_react_output(&output);
            debug!(iteration, step = ?step, "ReAct step");

            match step {
                ReasoningStep::Action {
                    thought,
                    action,
                    action_input,
                } => {
                    info!(thought = %thought, action = %action, "Thought");
                    let result = call_tool(&tools, &action, &action_input).await;
                    sources.extend(result.source_nodes.iter().cloned());
                    steps.push(ReasoningStep::Action {
                        thought,
                        action,
                        action_input,
                    });
                    steps.push(ReasoningStep::Observation {
                        observation: result.content,
                    });
                }
                ReasoningStep::Response { thought, response } => {
                    history.push(Message::user(message));
                    history.push(Message::assistant(response.clone()));
                    steps.push(ReasoningStep::Response {
                        thought,
                        response: response.clone(),
                    });

                    let mut out = Response::new(response, sources);
                    out.metadata
                        .insert("reasoning".into(), serde_json::to_value(&steps)?);
                    return Ok(out);
                }
                observation => steps.push(observation),
            }
        }
        Err(RagError::agent(format!(
            "reached max iterations ({}) without an answer",
            self.max_iterations
        )))
    }
}

#[async_trait]
impl QueryEngine for ReActAgent {
    async fn query(&self, query: &str) -> Result<Response> {
        self.chat(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::QueryEngineTool;
    use aisearch_core::MockLlmProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl QueryEngine for Upper {
        async fn query(&self, query: &str) -> Result<Response> {
            Ok(Response::new(query.to_uppercase(), Vec::new()))
        }
    }

    fn tools() -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(QueryEngineTool::from_defaults(
            Arc::new(Upper),
            "tool_shout",
            "Shouts the input",
        ))]
    }

    #[test]
    fn test_parse_action() {
        let step = parse_react_output(
            "Thought: I need a tool.\nAction: tool_shout\nAction Input: {\"input\": \"hello\"}\nObservation: invented",
        );
        assert_eq!(
            step,
            ReasoningStep::Action {
                thought: "I need a tool.".into(),
                action: "tool_shout".into(),
                action_input: json!({"input": "hello"}),
            }
        );
    }

    #[test]
    fn test_parse_single_quoted_input() {
        let step = parse_react_output("Thought: t\nAction: x\nAction Input: {'input': 'hi'}");
        assert!(matches!(step, ReasoningStep::Action { action_input, .. } if action_input == json!({"input": "hi"})));
    }

    #[test]
    fn test_parse_answer_and_implicit_answer() {
        assert_eq!(
            parse_react_output("Thought: I can answer.\nAnswer: 42"),
            ReasoningStep::Response {
                thought: "I can answer.".into(),
                response: "42".into()
            }
        );
        assert!(matches!(
            parse_react_output("Just 42."),
            ReasoningStep::Response { response, .. } if response == "Just 42."
        ));
    }

    #[tokio::test]
    async fn test_action_observation_answer() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("Thought: use it\nAction: tool_shout\nAction Input: {\"input\": \"quiet\"}");
        provider.queue_text("Thought: I can answer without using any more tools.\nAnswer: QUIET");
        let agent = ReActAgent::new(Brain::new(provider.clone()), ToolSource::Fixed(tools()))
            .with_system_prompt("Always use the tools.");

        let response = agent.query("Shout quiet").await.unwrap();
        assert_eq!(response.response, "QUIET");
        assert_eq!(response.metadata["reasoning"].as_array().unwrap().len(), 3);

        let second = &provider.requests()[1].messages;
        let system = second[0].content.text().to_string();
        assert!(system.starts_with("Always use the tools.\n\nYou are designed to help"));
        assert!(system.contains("> Tool Name: tool_shout"));
        assert_eq!(second.last().unwrap().content.text().to_string(), "Observation: QUIET");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("Thought: t\nAction: missing_tool\nAction Input: {\"input\": \"x\"}");
        provider.queue_text("Thought: done\nAnswer: sorry");
        let agent = ReActAgent::new(Brain::new(provider.clone()), ToolSource::Fixed(tools()));
        agent.query("q").await.unwrap();
        let observation = provider.requests()[1].messages.last().unwrap().content.text().to_string();
        assert_eq!(observation, "Observation: Error: No such tool named `missing_tool`.");
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let provider = Arc::new(MockLlmProvider::with_response(
            "Thought: again\nAction: tool_shout\nAction Input: {\"input\": \"x\"}",
        ));
        let agent = ReActAgent::new(Brain::new(provider), ToolSource::Fixed(tools()))
            .with_max_iterations(3);
        assert!(matches!(agent.query("q").await, Err(RagError::Agent(_))));
    }
}
