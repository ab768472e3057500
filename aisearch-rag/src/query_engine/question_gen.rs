//! Sub-question generation for the sub-question query engine.

use crate::error::{RagError, Result};
use crate::prompts;
use crate::tools::ToolMetadata;
use aisearch_core::Brain;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A question to route to one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub sub_question: String,
    pub tool_name: String,
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, tools: &[ToolMetadata], query: &str) -> Result<Vec<SubQuestion>>;
}

/// Asks the LLM to break a question down per tool.
pub struct LlmQuestionGenerator {
    brain: Brain,
    prompt: String,
}

impl LlmQuestionGenerator {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            prompt: prompts::SUB_QUESTION.to_string(),
        }
    }

    /// Put `prefix` in front of the default template.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prompt = format!("{}{}", prefix, prompts::SUB_QUESTION);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Tool names and descriptions as the JSON object the template expects.
pub fn tools_json(tools: &[ToolMetadata]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = tools
        .iter()
        .map(|t| (t.name.clone(), serde_json::Value::String(t.description.clone())))
        .collect();
    serde_json::to_string_pretty(&serde_json::Value::Object(map)).unwrap_or_else(|_| "{}".into())
}

/// The JSON payload of an LLM answer: a fenced block if there is one, else
/// the span from the first opening to the last closing bracket.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        let body = body.strip_prefix("json").unwrap_or(body);
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end >= start).then(|| &text[start..=end])
}

/// Parse `{"items": [...]}` or a bare array of sub-questions.
pub fn parse_sub_questions(text: &str) -> Result<Vec<SubQuestion>> {
    let json = extract_json(text)
        .ok_or_else(|| RagError::parse(format!("no JSON in sub-question output: {}", text)))?;
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| RagError::parse(format!("invalid sub-question JSON: {}", e)))?;
    let items = match value {
        serde_json::Value::Object(mut map) => map
            .remove("items")
            .ok_or_else(|| RagError::parse("sub-question JSON has no \"items\""))?,
        array @ serde_json::Value::Array(_) => array,
        other => {
            return Err(RagError::parse(format!(
                "unexpected sub-question JSON: {}",
                other
            )));
        }
    };
    serde_json::from_value(items)
        .map_err(|e| RagError::parse(format!("malformed sub-question item: {}", e)))
}

#[async_trait]
impl QuestionGenerator for LlmQuestionGenerator {
    async fn generate(&self, tools: &[ToolMetadata], query: &str) -> Result<Vec<SubQuestion>> {
        let tools_str = tools_json(tools);
        let prompt = prompts::render(
            &self.prompt,
            &[("tools_str", &tools_str), ("query_str", query)],
        );
        let answer = self.brain.predict(&prompt).await?;
        let questions = parse_sub_questions(&answer)?;
        debug!(count = questions.len(), "Generated sub questions");
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aisearch_core::MockLlmProvider;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_parse_fenced_items() {
        let text = "```json\n{\"items\": [{\"sub_question\": \"What is Uber revenue\", \"tool_name\": \"uber\"}]}\n```";
        assert_eq!(
            parse_sub_questions(text).unwrap(),
            vec![SubQuestion {
                sub_question: "What is Uber revenue".into(),
                tool_name: "uber".into()
            }]
        );
    }

    #[test]
    fn test_parse_bare_array() {
        let text = "Here you go: [{\"sub_question\": \"q\", \"tool_name\": \"t\"}]";
        assert_eq!(parse_sub_questions(text).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        assert!(matches!(
            parse_sub_questions("no idea"),
            Err(RagError::Parse(_))
        ));
        assert!(matches!(
            parse_sub_questions("{\"other\": 1}"),
            Err(RagError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_prefix_and_tools_reach_prompt() {
        let provider = Arc::new(MockLlmProvider::with_response("[]"));
        let generator =
            LlmQuestionGenerator::new(Brain::new(provider.clone())).with_prefix("Always cite. ");
        let tools = vec![ToolMetadata::new("sec_filing_documents", "financial information on companies")];
        let questions = generator.generate(&tools, "Compare R&D").await.unwrap();
        assert!(questions.is_empty());

        let prompt = provider.prompt_at(0).unwrap();
        assert!(prompt.starts_with("Always cite. Given a user question"));
        assert!(prompt.contains("\"sec_filing_documents\": \"financial information on companies\""));
        assert!(prompt.contains("<User Question>\nCompare R&D"));
    }
}
