use super::{DEFAULT_NUM_WORKERS, MetadataExtractor, run_prompts};
use crate::error::Result;
use crate::prompts;
use crate::schema::{Metadata, MetadataMode, Node};
use aisearch_core::Brain;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// `document_title`: a title per source document, from candidate titles of
/// its first `nodes` chunks combined by one more LLM call.
pub struct TitleExtractor {
    brain: Brain,
    nodes: usize,
    workers: usize,
}

impl TitleExtractor {
    pub fn new(brain: Brain, nodes: usize) -> Self {
        Self {
            brain,
            nodes: nodes.max(1),
            workers: DEFAULT_NUM_WORKERS,
        }
    }
}

#[async_trait]
impl MetadataExtractor for TitleExtractor {
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>> {
        let mut by_doc: BTreeMap<String, Vec<&Node>> = BTreeMap::new();
        for node in nodes {
            let key = node.ref_doc_id.clone().unwrap_or_else(|| node.id.clone());
            by_doc.entry(key).or_default().push(node);
        }

        let mut titles: BTreeMap<String, String> = BTreeMap::new();
        for (doc_id, doc_nodes) in &by_doc {
            let candidate_prompts: Vec<String> = doc_nodes
                .iter()
                .take(self.nodes)
                .map(|n| {
                    prompts::render(
                        prompts::TITLE_NODE,
                        &[("context_str", &n.get_content(MetadataMode::All))],
                    )
                })
                .collect();
            let candidates = run_prompts(&self.brain, candidate_prompts, self.workers).await?;
            let combined = prompts::render(
                prompts::TITLE_COMBINE,
                &[("context_str", &candidates.join(", "))],
            );
            let title = self.brain.predict(&combined).await?;
            titles.insert(doc_id.clone(), title.trim().trim_matches('"').to_string());
        }

        Ok(nodes
            .iter()
            .map(|n| {
                let key = n.ref_doc_id.as_ref().unwrap_or(&n.id);
                let mut metadata = Metadata::new();
                if let Some(title) = titles.get(key) {
                    metadata.insert("document_title".into(), title.clone());
                }
                metadata
            })
            .collect())
    }

    fn name(&self) -> &str {
        "TitleExtractor"
    }
}
