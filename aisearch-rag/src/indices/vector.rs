//! Vector store index: embedded nodes searched by cosine similarity.

use crate::error::{RagError, Result};
use crate::node_parser::{TransformComponent, nodes_from_documents};
use crate::query_engine::RetrieverQueryEngine;
use crate::response::{ResponseMode, ResponseSynthesizer};
use crate::retrievers::VectorIndexRetriever;
use crate::schema::{Document, MetadataMode, Node};
use crate::storage::{DocStore, IndexStruct, SimpleVectorStore, StorageContext, persist_merged};
use aisearch_core::{Brain, Embedder};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct VectorStoreIndex {
    index_id: String,
    node_ids: Arc<Vec<String>>,
    docstore: Arc<DocStore>,
    vector_store: Arc<SimpleVectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStoreIndex {
    /// Embed `nodes` (those without an embedding) and index them.
    pub async fn build(nodes: Vec<Node>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let missing: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        let texts: Vec<String> = missing
            .iter()
            .map(|&i| nodes[i].get_content(MetadataMode::Embed))
            .collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed_batch(&texts).await?
        };

        let mut docstore = DocStore::default();
        let mut vector_store = SimpleVectorStore::default();
        let mut node_ids = Vec::with_capacity(nodes.len());
        let mut fresh = missing.into_iter().zip(embeddings).peekable();
        for (i, node) in nodes.into_iter().enumerate() {
            let embedding = match fresh.peek() {
                Some((idx, _)) if *idx == i => fresh.next().map(|(_, e)| e),
                _ => node.embedding.clone(),
            }
            .ok_or_else(|| RagError::index(format!("no embedding for node {}", node.id)))?;
            vector_store.add(node.id.clone(), embedding);
            node_ids.push(node.id.clone());
            docstore.add(node);
        }

        info!(nodes = node_ids.len(), embedder = embedder.provider_name(), "Built vector index");
        Ok(Self {
            index_id: uuid::Uuid::new_v4().to_string(),
            node_ids: Arc::new(node_ids),
            docstore: Arc::new(docstore),
            vector_store: Arc::new(vector_store),
            embedder,
        })
    }

    /// Split documents with `splitter` and index the resulting nodes.
    pub async fn from_documents(
        documents: &[Document],
        splitter: &dyn TransformComponent,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let nodes = splitter.transform(nodes_from_documents(documents)).await?;
        Self::build(nodes, embedder).await
    }

    pub fn set_index_id(&mut self, index_id: impl Into<String>) {
        self.index_id = index_id.into();
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    /// Indexed nodes in insertion order.
    pub fn nodes(&self) -> Result<Vec<Node>> {
        self.docstore.get_many(&self.node_ids)
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    pub fn storage_context(&self) -> StorageContext {
        let mut ctx = StorageContext {
            docstore: (*self.docstore).clone(),
            vector_store: (*self.vector_store).clone(),
            ..Default::default()
        };
        ctx.index_store.add(IndexStruct::Vector {
            index_id: self.index_id.clone(),
            node_ids: (*self.node_ids).clone(),
        });
        ctx
    }

    /// Persist into `dir`, keeping other indexes already stored there.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        persist_merged(dir, self.storage_context())?;
        Ok(())
    }

    /// Load the vector index `index_id` (or the only index) from `dir`.
    pub fn load(dir: &Path, index_id: Option<&str>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let ctx = StorageContext::from_persist_dir(dir)?;
        Self::from_storage(&ctx, index_id, embedder)
    }

    pub fn from_storage(
        ctx: &StorageContext,
        index_id: Option<&str>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        match ctx.index_struct(index_id)? {
            IndexStruct::Vector { index_id, node_ids } => {
                info!(index_id = %index_id, nodes = node_ids.len(), "Loaded vector index");
                Ok(Self {
                    index_id: index_id.clone(),
                    node_ids: Arc::new(node_ids.clone()),
                    docstore: Arc::new(ctx.docstore.clone()),
                    vector_store: Arc::new(ctx.vector_store.clone()),
                    embedder,
                })
            }
            other => Err(RagError::index(format!(
                "index '{}' is a {} index, not a vector index",
                other.index_id(),
                other.kind()
            ))),
        }
    }

    pub fn as_retriever(&self, similarity_top_k: usize) -> VectorIndexRetriever {
        VectorIndexRetriever::new(
            self.node_ids.clone(),
            self.docstore.clone(),
            self.vector_store.clone(),
            self.embedder.clone(),
            similarity_top_k,
        )
    }

    pub fn as_query_engine(
        &self,
        brain: Brain,
        similarity_top_k: usize,
        mode: ResponseMode,
    ) -> RetrieverQueryEngine {
        RetrieverQueryEngine::new(
            Arc::new(self.as_retriever(similarity_top_k)),
            ResponseSynthesizer::new(brain, mode),
        )
    }
}

impl std::fmt::Debug for VectorStoreIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreIndex")
            .field("index_id", &self.index_id)
            .field("nodes", &self.node_ids.len())
            .finish()
    }
}
