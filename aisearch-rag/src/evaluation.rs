//! LLM-judged evaluation of answers.
//!
//! Both evaluators ask a YES/NO question over the answer's contexts, refining
//! the verdict chunk by chunk the same way a compact query refines an answer.

use crate::error::Result;
use crate::prompts;
use crate::response::{Response, ResponseMode, ResponseSynthesizer};
use crate::schema::MetadataMode;
use aisearch_core::Brain;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub query: Option<String>,
    pub contexts: Vec<String>,
    pub response: Option<String>,
    pub passing: Option<bool>,
    pub feedback: Option<String>,
    pub score: Option<f32>,
    pub pairwise_source: Option<String>,
    pub invalid_result: bool,
    pub invalid_reason: Option<String>,
}

impl EvaluationResult {
    fn invalid(
        query: Option<&str>,
        response: Option<&str>,
        contexts: &[String],
        reason: &str,
    ) -> Self {
        Self {
            query: query.map(str::to_string),
            response: response.map(str::to_string),
            contexts: contexts.to_vec(),
            invalid_result: true,
            invalid_reason: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        query: Option<&str>,
        response: Option<&str>,
        contexts: &[String],
    ) -> Result<EvaluationResult>;

    /// Evaluate a query engine answer against the nodes it was built from.
    async fn evaluate_response(&self, query: &str, response: &Response) -> Result<EvaluationResult> {
        let contexts: Vec<String> = response
            .source_nodes
            .iter()
            .map(|n| n.get_content(MetadataMode::None))
            .collect();
        self.evaluate(Some(query), Some(&response.response), &contexts)
            .await
    }
}

/// YES/NO judge shared by the evaluators.
struct Judge {
    synthesizer: ResponseSynthesizer,
}

impl Judge {
    fn new(brain: Brain, eval_template: &str, refine_template: &str) -> Self {
        Self {
            synthesizer: ResponseSynthesizer::new(brain, ResponseMode::Compact)
                .with_text_qa_template(eval_template)
                .with_refine_template(refine_template),
        }
    }

    /// `(passing, score, raw verdict)`.
    async fn verdict(&self, question: &str, contexts: &[String]) -> Result<(bool, f32, String)> {
        let raw = self.synthesizer.get_response(question, contexts).await?;
        let passing = raw.to_lowercase().contains("yes");
        debug!(passing, verdict = %raw, "Evaluation verdict");
        Ok((passing, if passing { 1.0 } else { 0.0 }, raw))
    }
}

fn has_contexts(contexts: &[String]) -> bool {
    contexts.iter().any(|c| !c.trim().is_empty())
}

/// Is the answer supported by the retrieved context?
pub struct FaithfulnessEvaluator {
    judge: Judge,
}

impl FaithfulnessEvaluator {
    pub fn new(brain: Brain) -> Self {
        Self {
            judge: Judge::new(brain, prompts::FAITHFULNESS_EVAL, prompts::FAITHFULNESS_REFINE),
        }
    }
}

#[async_trait]
impl Evaluator for FaithfulnessEvaluator {
    async fn evaluate(
        &self,
        query: Option<&str>,
        response: Option<&str>,
        contexts: &[String],
    ) -> Result<EvaluationResult> {
        let Some(answer) = response.filter(|r| !r.trim().is_empty()) else {
            warn!("Faithfulness evaluation without a response");
            return Ok(EvaluationResult::invalid(query, response, contexts, "response must be provided"));
        };
        if !has_contexts(contexts) {
            warn!("Faithfulness evaluation without contexts");
            return Ok(EvaluationResult::invalid(query, response, contexts, "contexts must be provided"));
        }
        let (passing, score, raw) = self.judge.verdict(answer, contexts).await?;
        Ok(EvaluationResult {
            query: query.map(str::to_string),
            contexts: contexts.to_vec(),
            response: Some(answer.to_string()),
            passing: Some(passing),
            feedback: Some(raw),
            score: Some(score),
            ..Default::default()
        })
    }
}

/// Are the query and answer in line with the retrieved context?
pub struct RelevancyEvaluator {
    judge: Judge,
}

impl RelevancyEvaluator {
    pub fn new(brain: Brain) -> Self {
        Self {
            judge: Judge::new(brain, prompts::RELEVANCY_EVAL, prompts::RELEVANCY_REFINE),
        }
    }
}

#[async_trait]
impl Evaluator for RelevancyEvaluator {
    async fn evaluate(
        &self,
        query: Option<&str>,
        response: Option<&str>,
        contexts: &[String],
    ) -> Result<EvaluationResult> {
        let (Some(question), Some(answer)) = (query, response) else {
            return Ok(EvaluationResult::invalid(
                query,
                response,
                contexts,
                "query and response must be provided",
            ));
        };
        if !has_contexts(contexts) {
            warn!("Relevancy evaluation without contexts");
            return Ok(EvaluationResult::invalid(query, response, contexts, "contexts must be provided"));
        }
        let query_str = format!("Question: {}\nResponse: {}", question, answer);
        let (passing, score, raw) = self.judge.verdict(&query_str, contexts).await?;
        Ok(EvaluationResult {
            query: Some(question.to_string()),
            contexts: contexts.to_vec(),
            response: Some(answer.to_string()),
            passing: Some(passing),
            feedback: Some(raw),
            score: Some(score),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Node, NodeWithScore};
    use aisearch_core::MockLlmProvider;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_faithfulness_passing() {
        let provider = Arc::new(MockLlmProvider::with_response("YES"));
        let evaluator = FaithfulnessEvaluator::new(Brain::new(provider.clone()));
        let response = Response::new(
            "He sold Viaweb to Yahoo.",
            vec![NodeWithScore::new(Node::new("Viaweb was bought by Yahoo."), Some(0.7))],
        );
        let result = evaluator.evaluate_response("What happened?", &response).await.unwrap();

        assert_eq!(result.passing, Some(true));
        assert_eq!(result.score, Some(1.0));
        assert_eq!(result.feedback.as_deref(), Some("YES"));
        assert!(!result.invalid_result);
        let prompt = provider.prompt_at(0).unwrap();
        assert!(prompt.contains("Information: He sold Viaweb to Yahoo."));
        assert!(prompt.contains("Context: Viaweb was bought by Yahoo."));
    }

    #[tokio::test]
    async fn test_relevancy_failing() {
        let provider = Arc::new(MockLlmProvider::with_response("NO"));
        let evaluator = RelevancyEvaluator::new(Brain::new(provider.clone()));
        let result = evaluator
            .evaluate(Some("Who?"), Some("Nobody"), &["Paul".to_string()])
            .await
            .unwrap();
        assert_eq!(result.passing, Some(false));
        assert_eq!(result.score, Some(0.0));
        assert!(provider.prompt_at(0).unwrap().contains("Question: Who?\nResponse: Nobody"));
    }

    #[tokio::test]
    async fn test_missing_inputs_are_invalid_not_errors() {
        let provider = Arc::new(MockLlmProvider::new());
        let faithfulness = FaithfulnessEvaluator::new(Brain::new(provider.clone()));
        let result = faithfulness.evaluate(Some("q"), Some("a"), &[]).await.unwrap();
        assert!(result.invalid_result);
        assert_eq!(result.invalid_reason.as_deref(), Some("contexts must be provided"));
        assert!(result.passing.is_none());

        let relevancy = RelevancyEvaluator::new(Brain::new(provider.clone()));
        let result = relevancy.evaluate(None, Some("a"), &["c".into()]).await.unwrap();
        assert!(result.invalid_result);
        assert_eq!(provider.request_count(), 0);
    }
}
