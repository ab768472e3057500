use super::{DEFAULT_NUM_WORKERS, MetadataExtractor, run_prompts};
use crate::error::Result;
use crate::prompts;
use crate::schema::{Metadata, MetadataMode, Node};
use aisearch_core::Brain;
use async_trait::async_trait;

/// `excerpt_keywords`: comma separated keywords per node.
pub struct KeywordExtractor {
    brain: Brain,
    keywords: usize,
    workers: usize,
}

impl KeywordExtractor {
    pub fn new(brain: Brain, keywords: usize) -> Self {
        Self {
            brain,
            keywords: keywords.max(1),
            workers: DEFAULT_NUM_WORKERS,
        }
    }
}

#[async_trait]
impl MetadataExtractor for KeywordExtractor {
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>> {
        let keywords = self.keywords.to_string();
        let requests = nodes
            .iter()
            .map(|n| {
                prompts::render(
                    prompts::KEYWORDS,
                    &[
                        ("context_str", &n.get_content(MetadataMode::All)),
                        ("keywords", &keywords),
                    ],
                )
            })
            .collect();
        let answers = run_prompts(&self.brain, requests, self.workers).await?;
        Ok(answers
            .into_iter()
            .map(|a| Metadata::from([("excerpt_keywords".to_string(), a)]))
            .collect())
    }

    fn name(&self) -> &str {
        "KeywordExtractor"
    }
}
