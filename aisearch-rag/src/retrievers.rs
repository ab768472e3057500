//! Retrievers: find the nodes relevant to a query.

use crate::error::Result;
use crate::postprocessor::NodePostprocessor;
use crate::schema::{MetadataMode, NodeWithScore};
use crate::storage::{DocStore, SimpleVectorStore};
use aisearch_core::Embedder;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>>;
}

/// Top-k cosine search over a vector index.
pub struct VectorIndexRetriever {
    node_ids: Arc<Vec<String>>,
    docstore: Arc<DocStore>,
    vector_store: Arc<SimpleVectorStore>,
    embedder: Arc<dyn Embedder>,
    similarity_top_k: usize,
}

impl VectorIndexRetriever {
    pub fn new(
        node_ids: Arc<Vec<String>>,
        docstore: Arc<DocStore>,
        vector_store: Arc<SimpleVectorStore>,
        embedder: Arc<dyn Embedder>,
        similarity_top_k: usize,
    ) -> Self {
        Self {
            node_ids,
            docstore,
            vector_store,
            embedder,
            similarity_top_k,
        }
    }

    pub fn similarity_top_k(&self) -> usize {
        self.similarity_top_k
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let query_embedding = self.embedder.embed(query).await?;
        let hits = self
            .vector_store
            .query(&query_embedding, self.similarity_top_k, &self.node_ids);
        debug!(hits = hits.len(), top_k = self.similarity_top_k, "Vector retrieval");

        let mut results = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            let node = self.docstore.get_many(std::slice::from_ref(&id))?;
            results.extend(node.into_iter().map(|n| NodeWithScore::new(n, Some(score))));
        }
        Ok(results)
    }
}

/// Returns every node of a summary index, unscored, in insertion order.
pub struct SummaryIndexRetriever {
    node_ids: Arc<Vec<String>>,
    docstore: Arc<DocStore>,
}

impl SummaryIndexRetriever {
    pub fn new(node_ids: Arc<Vec<String>>, docstore: Arc<DocStore>) -> Self {
        Self { node_ids, docstore }
    }
}

#[async_trait]
impl Retriever for SummaryIndexRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<NodeWithScore>> {
        Ok(self
            .docstore
            .get_many(&self.node_ids)?
            .into_iter()
            .map(|n| NodeWithScore::new(n, None))
            .collect())
    }
}

/// A retriever whose results pass through a postprocessor, such as an LLM reranker.
pub struct RerankingRetriever {
    inner: Arc<dyn Retriever>,
    postprocessor: Arc<dyn NodePostprocessor>,
}

impl RerankingRetriever {
    pub fn new(inner: Arc<dyn Retriever>, postprocessor: Arc<dyn NodePostprocessor>) -> Self {
        Self {
            inner,
            postprocessor,
        }
    }
}

#[async_trait]
impl Retriever for RerankingRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let nodes = self.inner.retrieve(query).await?;
        let before = nodes.len();
        let nodes = self.postprocessor.postprocess(nodes, query).await?;
        debug!(
            before,
            after = nodes.len(),
            postprocessor = self.postprocessor.name(),
            "Reranked retrieval"
        );
        Ok(nodes)
    }
}

/// Render retrieved nodes as a numbered listing, as shown on the console.
pub fn format_nodes(nodes: &[NodeWithScore]) -> String {
    nodes
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let score = n
                .score
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "[{}] id={} score={}\n{}",
                i + 1,
                n.id(),
                score,
                n.get_content(MetadataMode::None)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocessor::TopN;
    use crate::schema::Node;

    struct Fixed(Vec<NodeWithScore>);

    #[async_trait]
    impl Retriever for Fixed {
        async fn retrieve(&self, _query: &str) -> Result<Vec<NodeWithScore>> {
            Ok(self.0.clone())
        }
    }

    fn scored(text: &str, score: f32) -> NodeWithScore {
        NodeWithScore::new(Node::new(text), Some(score))
    }

    #[tokio::test]
    async fn test_reranking_retriever_applies_postprocessor() {
        let inner = Arc::new(Fixed(vec![scored("a", 0.9), scored("b", 0.5), scored("c", 0.1)]));
        let retriever = RerankingRetriever::new(inner, Arc::new(TopN::new(2)));
        let hits = retriever.retrieve("q").await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_format_nodes() {
        let mut unscored = NodeWithScore::new(Node::new("second").with_id("n2"), None);
        unscored.node.metadata.insert("file_name".into(), "x.txt".into());
        let out = format_nodes(&[NodeWithScore::new(Node::new("first").with_id("n1"), Some(0.5)), unscored]);
        assert_eq!(out, "[1] id=n1 score=0.5000\nfirst\n\n[2] id=n2 score=-\nsecond");
    }
}
