//! Query engines: retrieval plus synthesis behind a single `query` call.

pub mod question_gen;
pub mod sub_question;

pub use question_gen::{LlmQuestionGenerator, QuestionGenerator, SubQuestion};
pub use sub_question::SubQuestionQueryEngine;

use crate::error::Result;
use crate::postprocessor::NodePostprocessor;
use crate::response::{Response, ResponseSynthesizer};
use crate::retrievers::Retriever;
use crate::schema::NodeWithScore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &str) -> Result<Response>;
}

/// Retrieve, postprocess, synthesize.
pub struct RetrieverQueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: ResponseSynthesizer,
    postprocessors: Vec<Arc<dyn NodePostprocessor>>,
}

impl RetrieverQueryEngine {
    pub fn new(retriever: Arc<dyn Retriever>, synthesizer: ResponseSynthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
            postprocessors: Vec::new(),
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: Arc<dyn NodePostprocessor>) -> Self {
        self.postprocessors.push(postprocessor);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: ResponseSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// Retrieved nodes after every postprocessor.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let mut nodes = self.retriever.retrieve(query).await?;
        for postprocessor in &self.postprocessors {
            nodes = postprocessor.postprocess(nodes, query).await?;
        }
        Ok(nodes)
    }
}

#[async_trait]
impl QueryEngine for RetrieverQueryEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let nodes = self.retrieve(query).await?;
        info!(nodes = nodes.len(), mode = ?self.synthesizer.mode(), "Answering query");
        self.synthesizer.synthesize(query, nodes).await
    }
}
