//! Retrieving tools instead of text: an index over tool descriptions.

use crate::error::{RagError, Result};
use crate::indices::VectorStoreIndex;
use crate::query_engine::{LlmQuestionGenerator, SubQuestionQueryEngine};
use crate::response::{ResponseMode, ResponseSynthesizer};
use crate::retrievers::{Retriever, VectorIndexRetriever};
use crate::schema::Node;
use crate::tools::{QueryEngineTool, Tool, ToolMetadata};
use aisearch_core::{Brain, Embedder};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const COMPARE_TOOL_NAME: &str = "compare_tool";
pub const COMPARE_TOOL_DESCRIPTION: &str = "Useful for any queries that involve comparing multiple documents. ALWAYS use this tool for comparison queries - make sure to call this tool with the original query. Do NOT use the other tools for any queries involving multiple documents.";

/// Two-way mapping between tools and the nodes that describe them.
#[derive(Default)]
pub struct ToolNodeMapping {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolNodeMapping {
    pub fn from_tools(tools: &[Arc<dyn Tool>]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|t| (t.name().to_string(), t.clone()))
                .collect(),
        }
    }

    /// Node id is the tool name; text is `name: description`.
    pub fn to_node(metadata: &ToolMetadata) -> Node {
        let mut node = Node::new(format!("{}: {}", metadata.name, metadata.description))
            .with_id(metadata.name.clone())
            .with_metadata("name", metadata.name.clone());
        node.excluded_embed_metadata_keys = vec!["name".into()];
        node.excluded_llm_metadata_keys = vec!["name".into()];
        node
    }

    pub fn from_node(&self, node: &Node) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(&node.id)
            .cloned()
            .ok_or_else(|| RagError::tool(format!("no tool mapped to node '{}'", node.id)))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A vector index whose nodes stand for tools.
pub struct ObjectIndex {
    index: VectorStoreIndex,
    mapping: Arc<ToolNodeMapping>,
}

impl ObjectIndex {
    pub async fn from_tools(tools: &[Arc<dyn Tool>], embedder: Arc<dyn Embedder>) -> Result<Self> {
        let nodes = tools
            .iter()
            .map(|t| ToolNodeMapping::to_node(t.metadata()))
            .collect();
        let index = VectorStoreIndex::build(nodes, embedder).await?;
        Ok(Self {
            index,
            mapping: Arc::new(ToolNodeMapping::from_tools(tools)),
        })
    }

    pub fn mapping(&self) -> &Arc<ToolNodeMapping> {
        &self.mapping
    }

    /// Retriever returning tool nodes rather than tools.
    pub fn as_node_retriever(&self, similarity_top_k: usize) -> VectorIndexRetriever {
        self.index.as_retriever(similarity_top_k)
    }

    pub fn as_retriever(&self, similarity_top_k: usize) -> ObjectRetriever {
        ObjectRetriever::new(
            Arc::new(self.as_node_retriever(similarity_top_k)),
            self.mapping.clone(),
        )
    }
}

#[async_trait]
pub trait ToolRetriever: Send + Sync {
    async fn retrieve_tools(&self, query: &str) -> Result<Vec<Arc<dyn Tool>>>;
}

/// Maps the nodes a retriever returns back to their tools.
pub struct ObjectRetriever {
    retriever: Arc<dyn Retriever>,
    mapping: Arc<ToolNodeMapping>,
}

impl ObjectRetriever {
    pub fn new(retriever: Arc<dyn Retriever>, mapping: Arc<ToolNodeMapping>) -> Self {
        Self { retriever, mapping }
    }
}

#[async_trait]
impl ToolRetriever for ObjectRetriever {
    async fn retrieve_tools(&self, query: &str) -> Result<Vec<Arc<dyn Tool>>> {
        let nodes = self.retriever.retrieve(query).await?;
        nodes.iter().map(|n| self.mapping.from_node(&n.node)).collect()
    }
}

/// Adds a `compare_tool` to every retrieval: a sub-question engine over the
/// tools that were retrieved.
pub struct CompareToolRetriever {
    inner: Arc<dyn ToolRetriever>,
    brain: Brain,
}

impl CompareToolRetriever {
    pub fn new(inner: Arc<dyn ToolRetriever>, brain: Brain) -> Self {
        Self { inner, brain }
    }
}

#[async_trait]
impl ToolRetriever for CompareToolRetriever {
    async fn retrieve_tools(&self, query: &str) -> Result<Vec<Arc<dyn Tool>>> {
        let mut tools = self.inner.retrieve_tools(query).await?;
        debug!(tools = tools.len(), "Retrieved tools");
        let engine = SubQuestionQueryEngine::new(
            Arc::new(LlmQuestionGenerator::new(self.brain.clone())),
            tools.clone(),
            ResponseSynthesizer::new(self.brain.clone(), ResponseMode::Compact),
        );
        tools.push(Arc::new(QueryEngineTool::from_defaults(
            Arc::new(engine),
            COMPARE_TOOL_NAME,
            COMPARE_TOOL_DESCRIPTION,
        )));
        Ok(tools)
    }
}
