//! Index types built over parsed nodes.

pub mod knowledge_graph;
pub mod summary;
pub mod vector;

pub use knowledge_graph::{
    KgBuildOptions, KgRetriever, KgRetrieverMode, KgRetrieverOptions, KnowledgeGraphIndex,
};
pub use summary::SummaryIndex;
pub use vector::VectorStoreIndex;
