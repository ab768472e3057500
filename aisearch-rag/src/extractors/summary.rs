use super::{DEFAULT_NUM_WORKERS, MetadataExtractor, run_prompts};
use crate::error::Result;
use crate::prompts;
use crate::schema::{Metadata, MetadataMode, Node};
use aisearch_core::Brain;
use async_trait::async_trait;

/// Which neighbouring summaries a node receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Prev,
    SelfSummary,
    Next,
}

/// `section_summary`, `prev_section_summary` and `next_section_summary`.
pub struct SummaryExtractor {
    brain: Brain,
    summaries: Vec<SummaryKind>,
    workers: usize,
}

impl SummaryExtractor {
    pub fn new(brain: Brain, summaries: Vec<SummaryKind>) -> Self {
        Self {
            brain,
            summaries,
            workers: DEFAULT_NUM_WORKERS,
        }
    }

    fn wants(&self, kind: SummaryKind) -> bool {
        self.summaries.contains(&kind)
    }
}

#[async_trait]
impl MetadataExtractor for SummaryExtractor {
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>> {
        if self.summaries.is_empty() {
            return Ok(vec![Metadata::new(); nodes.len()]);
        }
        let requests = nodes
            .iter()
            .map(|n| {
                prompts::render(
                    prompts::SECTION_SUMMARY,
                    &[("context_str", &n.get_content(MetadataMode::All))],
                )
            })
            .collect();
        let summaries = run_prompts(&self.brain, requests, self.workers).await?;

        Ok((0..nodes.len())
            .map(|i| {
                let mut metadata = Metadata::new();
                if self.wants(SummaryKind::SelfSummary) {
                    metadata.insert("section_summary".into(), summaries[i].clone());
                }
                if self.wants(SummaryKind::Prev) && i > 0 {
                    metadata.insert("prev_section_summary".into(), summaries[i - 1].clone());
                }
                if self.wants(SummaryKind::Next) && i + 1 < nodes.len() {
                    metadata.insert("next_section_summary".into(), summaries[i + 1].clone());
                }
                metadata
            })
            .collect())
    }

    fn name(&self) -> &str {
        "SummaryExtractor"
    }
}
