//! Summary index: every node is handed to the synthesizer.

use crate::error::{RagError, Result};
use crate::node_parser::{TransformComponent, nodes_from_documents};
use crate::query_engine::RetrieverQueryEngine;
use crate::response::{ResponseMode, ResponseSynthesizer};
use crate::retrievers::SummaryIndexRetriever;
use crate::schema::{Document, Node};
use crate::storage::{DocStore, IndexStruct, StorageContext, persist_merged};
use aisearch_core::Brain;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub struct SummaryIndex {
    index_id: String,
    node_ids: Arc<Vec<String>>,
    docstore: Arc<DocStore>,
}

impl SummaryIndex {
    pub fn new(nodes: Vec<Node>) -> Self {
        let mut docstore = DocStore::default();
        let node_ids = nodes.iter().map(|n| n.id.clone()).collect();
        for node in nodes {
            docstore.add(node);
        }
        Self {
            index_id: uuid::Uuid::new_v4().to_string(),
            node_ids: Arc::new(node_ids),
            docstore: Arc::new(docstore),
        }
    }

    pub async fn from_documents(
        documents: &[Document],
        splitter: &dyn TransformComponent,
    ) -> Result<Self> {
        let nodes = splitter.transform(nodes_from_documents(documents)).await?;
        Ok(Self::new(nodes))
    }

    pub fn set_index_id(&mut self, index_id: impl Into<String>) {
        self.index_id = index_id.into();
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn nodes(&self) -> Result<Vec<Node>> {
        self.docstore.get_many(&self.node_ids)
    }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        let mut ctx = StorageContext {
            docstore: (*self.docstore).clone(),
            ..Default::default()
        };
        ctx.index_store.add(IndexStruct::List {
            index_id: self.index_id.clone(),
            node_ids: (*self.node_ids).clone(),
        });
        persist_merged(dir, ctx)?;
        Ok(())
    }

    pub fn load(dir: &Path, index_id: Option<&str>) -> Result<Self> {
        let ctx = StorageContext::from_persist_dir(dir)?;
        match ctx.index_struct(index_id)? {
            IndexStruct::List { index_id, node_ids } => Ok(Self {
                index_id: index_id.clone(),
                node_ids: Arc::new(node_ids.clone()),
                docstore: Arc::new(ctx.docstore.clone()),
            }),
            other => Err(RagError::index(format!(
                "index '{}' is a {} index, not a summary index",
                other.index_id(),
                other.kind()
            ))),
        }
    }

    pub fn as_retriever(&self) -> SummaryIndexRetriever {
        SummaryIndexRetriever::new(self.node_ids.clone(), self.docstore.clone())
    }

    pub fn as_query_engine(&self, brain: Brain, mode: ResponseMode) -> RetrieverQueryEngine {
        RetrieverQueryEngine::new(
            Arc::new(self.as_retriever()),
            ResponseSynthesizer::new(brain, mode),
        )
    }
}
