//! Breaks a question into per-tool sub-questions and answers over their answers.

use super::QueryEngine;
use super::question_gen::{QuestionGenerator, SubQuestion};
use crate::error::Result;
use crate::response::{Response, ResponseSynthesizer};
use crate::schema::{Node, NodeWithScore};
use crate::tools::{Tool, ToolMetadata};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
struct SubQuestionAnswer {
    sub_question: String,
    tool_name: String,
    answer: String,
    #[serde(skip)]
    sources: Vec<NodeWithScore>,
}

pub struct SubQuestionQueryEngine {
    question_gen: Arc<dyn QuestionGenerator>,
    tools: Vec<Arc<dyn Tool>>,
    synthesizer: ResponseSynthesizer,
    use_async: bool,
}

impl SubQuestionQueryEngine {
    pub fn new(
        question_gen: Arc<dyn QuestionGenerator>,
        tools: Vec<Arc<dyn Tool>>,
        synthesizer: ResponseSynthesizer,
    ) -> Self {
        Self {
            question_gen,
            tools,
            synthesizer,
            use_async: true,
        }
    }

    /// Run sub-questions concurrently (the default) or one after another.
    pub fn use_async(mut self, use_async: bool) -> Self {
        self.use_async = use_async;
        self
    }

    pub fn tool_metadata(&self) -> Vec<ToolMetadata> {
        self.tools.iter().map(|t| t.metadata().clone()).collect()
    }

    async fn answer(&self, question: &SubQuestion) -> Option<SubQuestionAnswer> {
        let Some(tool) = self.tools.iter().find(|t| t.name() == question.tool_name) else {
            warn!(tool = %question.tool_name, "Sub question names an unknown tool, skipping");
            return None;
        };
        info!(tool = %question.tool_name, question = %question.sub_question, "Sub question");
        match tool.call(&question.sub_question).await {
            Ok(output) => {
                info!(tool = %question.tool_name, answer = %output.content, "Sub answer");
                Some(SubQuestionAnswer {
                    sub_question: question.sub_question.clone(),
                    tool_name: question.tool_name.clone(),
                    answer: output.content,
                    sources: output.source_nodes,
                })
            }
            Err(e) => {
                warn!(tool = %question.tool_name, error = %e, "Sub question failed, skipping");
                None
            }
        }
    }
}

#[async_trait]
impl QueryEngine for SubQuestionQueryEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let questions = self
            .question_gen
            .generate(&self.tool_metadata(), query)
            .await?;
        info!(count = questions.len(), "Generated sub questions");

        let answers: Vec<SubQuestionAnswer> = if self.use_async {
            join_all(questions.iter().map(|q| self.answer(q)))
                .await
                .into_iter()
                .flatten()
                .collect()
        } else {
            let mut answers = Vec::new();
            for question in &questions {
                answers.extend(self.answer(question).await);
            }
            answers
        };

        let qa_nodes: Vec<NodeWithScore> = answers
            .iter()
            .map(|a| {
                NodeWithScore::new(
                    Node::new(format!(
                        "Sub question: {}\nResponse: {}",
                        a.sub_question, a.answer
                    )),
                    None,
                )
            })
            .collect();

        let mut response = self.synthesizer.synthesize(query, qa_nodes).await?;
        response
            .source_nodes
            .extend(answers.iter().flat_map(|a| a.sources.iter().cloned()));
        response
            .metadata
            .insert("sub_qa".into(), serde_json::to_value(&answers)?);
        Ok(response)
    }
}
