//! Ingestion pipeline: documents through a chain of transformations.

use crate::error::Result;
use crate::node_parser::{TransformComponent, nodes_from_documents};
use crate::schema::{Document, Node};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Default)]
pub struct IngestionPipeline {
    transformations: Vec<Arc<dyn TransformComponent>>,
}

impl IngestionPipeline {
    pub fn new(transformations: Vec<Arc<dyn TransformComponent>>) -> Self {
        Self { transformations }
    }

    pub fn with_transformation(mut self, step: Arc<dyn TransformComponent>) -> Self {
        self.transformations.push(step);
        self
    }

    /// One node per document, then every transformation in order.
    pub async fn run(&self, documents: &[Document]) -> Result<Vec<Node>> {
        let mut nodes = nodes_from_documents(documents);
        for step in &self.transformations {
            let started = Instant::now();
            nodes = step.transform(nodes).await?;
            info!(
                step = step.name(),
                nodes = nodes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Ingestion step finished"
            );
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{CustomExtractor, KeywordExtractor, TitleExtractor};
    use crate::node_parser::TokenTextSplitter;
    use aisearch_core::{Brain, MockLlmProvider};

    #[tokio::test]
    async fn test_splitter_then_extractors() {
        let provider = Arc::new(MockLlmProvider::with_response("Uber"));
        let brain = Brain::new(provider);
        let pipeline = IngestionPipeline::new(vec![
            Arc::new(TokenTextSplitter::new(512, 128).unwrap().with_separator(" ")),
            Arc::new(TitleExtractor::new(brain.clone(), 5)),
            Arc::new(KeywordExtractor::new(brain, 5)),
            Arc::new(CustomExtractor),
        ]);
        let docs = vec![Document::new("Uber had revenue.").with_metadata("page_label", "1")];
        let nodes = pipeline.run(&docs).await.unwrap();

        assert_eq!(nodes.len(), 1);
        let meta = &nodes[0].metadata;
        assert_eq!(meta["page_label"], "1");
        assert_eq!(meta["document_title"], "Uber");
        assert_eq!(meta["custom"], "Uber\nUber");
    }
}
