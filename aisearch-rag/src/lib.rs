//! # aisearch rag
//!
//! Retrieval-augmented generation building blocks: document readers, node
//! parsers and metadata extractors, vector / summary / knowledge graph
//! indexes with JSON persistence, retrievers, response synthesis, query
//! engines, LLM-judged evaluation, tools and agents.

pub mod agent;
pub mod error;
pub mod evaluation;
pub mod extractors;
pub mod graph_stores;
pub mod indices;
pub mod ingestion;
pub mod node_parser;
pub mod objects;
pub mod postprocessor;
pub mod prompts;
pub mod query_engine;
pub mod readers;
pub mod response;
pub mod retrievers;
pub mod schema;
pub mod storage;
pub mod tools;

pub use agent::{FunctionCallingAgent, ReActAgent, ReasoningStep, ToolSource};
pub use error::{RagError, Result};
pub use evaluation::{EvaluationResult, Evaluator, FaithfulnessEvaluator, RelevancyEvaluator};
pub use graph_stores::{GraphStore, Neo4jConfig, Neo4jGraphStore, SimpleGraphStore, Triplet};
pub use indices::{
    KgBuildOptions, KgRetriever, KgRetrieverMode, KgRetrieverOptions, KnowledgeGraphIndex,
    SummaryIndex, VectorStoreIndex,
};
pub use ingestion::IngestionPipeline;
pub use node_parser::{
    SemanticSplitter, SentenceSplitter, TextSplitter, TokenTextSplitter, TransformComponent,
};
pub use objects::{CompareToolRetriever, ObjectIndex, ObjectRetriever, ToolNodeMapping, ToolRetriever};
pub use postprocessor::{LlmRerank, NodePostprocessor, SimilarityCutoff, TopN};
pub use query_engine::{
    LlmQuestionGenerator, QueryEngine, QuestionGenerator, RetrieverQueryEngine, SubQuestion,
    SubQuestionQueryEngine,
};
pub use readers::DirectoryReader;
pub use response::{PromptHelper, Response, ResponseMode, ResponseSynthesizer};
pub use retrievers::{RerankingRetriever, Retriever, SummaryIndexRetriever, VectorIndexRetriever};
pub use schema::{Document, Metadata, MetadataMode, Node, NodeWithScore};
pub use storage::StorageContext;
pub use tools::{QueryEngineTool, Tool, ToolMetadata, ToolOutput};
