//! Metadata extractors.
//!
//! Each extractor computes one metadata map per node and merges it into the
//! node. They run as ingestion steps after a splitter.

pub mod custom;
pub mod entity;
pub mod keyword;
pub mod questions;
pub mod summary;
pub mod title;

pub use custom::CustomExtractor;
pub use entity::EntityExtractor;
pub use keyword::KeywordExtractor;
pub use questions::QuestionsAnsweredExtractor;
pub use summary::{SummaryExtractor, SummaryKind};
pub use title::TitleExtractor;

use crate::error::Result;
use crate::schema::{Metadata, Node};
use aisearch_core::Brain;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};

/// Concurrent LLM calls per extractor.
pub const DEFAULT_NUM_WORKERS: usize = 4;

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// One metadata map per node, in node order.
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>>;

    fn name(&self) -> &str;
}

/// Merge extracted metadata into `nodes`.
pub async fn apply_extractor(
    extractor: &dyn MetadataExtractor,
    mut nodes: Vec<Node>,
) -> Result<Vec<Node>> {
    let extracted = extractor.extract(&nodes).await?;
    for (node, metadata) in nodes.iter_mut().zip(extracted) {
        node.metadata.extend(metadata);
    }
    tracing::debug!(extractor = extractor.name(), nodes = nodes.len(), "Extracted metadata");
    Ok(nodes)
}

/// Run `prompts` through the LLM with at most `workers` in flight. Answers
/// come back trimmed and in prompt order.
pub(crate) async fn run_prompts(
    brain: &Brain,
    prompts: Vec<String>,
    workers: usize,
) -> Result<Vec<String>> {
    let answers: Vec<String> = stream::iter(prompts)
        .map(|prompt| async move { brain.predict(&prompt).await })
        .buffered(workers.max(1))
        .try_collect()
        .await?;
    Ok(answers)
}

macro_rules! impl_transform_for_extractor {
    ($($ty:ty),+ $(,)?) => {
        $(
            #[async_trait::async_trait]
            impl crate::node_parser::TransformComponent for $ty {
                async fn transform(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
                    apply_extractor(self, nodes).await
                }

                fn name(&self) -> &str {
                    MetadataExtractor::name(self)
                }
            }
        )+
    };
}

impl_transform_for_extractor!(
    CustomExtractor,
    EntityExtractor,
    KeywordExtractor,
    QuestionsAnsweredExtractor,
    SummaryExtractor,
    TitleExtractor,
);
