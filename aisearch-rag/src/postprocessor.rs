//! Node postprocessors run between retrieval and synthesis.

use crate::error::Result;
use crate::prompts;
use crate::schema::{MetadataMode, NodeWithScore};
use aisearch_core::Brain;
use async_trait::async_trait;
use tracing::{debug, warn};

#[async_trait]
pub trait NodePostprocessor: Send + Sync {
    async fn postprocess(&self, nodes: Vec<NodeWithScore>, query: &str)
    -> Result<Vec<NodeWithScore>>;

    fn name(&self) -> &str;
}

/// Drops nodes scoring below `cutoff`. Unscored nodes are kept.
pub struct SimilarityCutoff {
    pub cutoff: f32,
}

#[async_trait]
impl NodePostprocessor for SimilarityCutoff {
    async fn postprocess(
        &self,
        nodes: Vec<NodeWithScore>,
        _query: &str,
    ) -> Result<Vec<NodeWithScore>> {
        Ok(nodes
            .into_iter()
            .filter(|n| n.score.is_none_or(|s| s >= self.cutoff))
            .collect())
    }

    fn name(&self) -> &str {
        "similarity_cutoff"
    }
}

/// Keeps the first `n` nodes.
pub struct TopN {
    n: usize,
}

impl TopN {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

#[async_trait]
impl NodePostprocessor for TopN {
    async fn postprocess(
        &self,
        mut nodes: Vec<NodeWithScore>,
        _query: &str,
    ) -> Result<Vec<NodeWithScore>> {
        nodes.truncate(self.n);
        Ok(nodes)
    }

    fn name(&self) -> &str {
        "top_n"
    }
}

/// Asks the LLM to pick and score the relevant nodes, batch by batch, and
/// keeps the `top_n` best.
pub struct LlmRerank {
    brain: Brain,
    top_n: usize,
    choice_batch_size: usize,
}

impl LlmRerank {
    pub fn new(brain: Brain, top_n: usize) -> Self {
        Self {
            brain,
            top_n,
            choice_batch_size: 10,
        }
    }

    pub fn with_choice_batch_size(mut self, size: usize) -> Self {
        self.choice_batch_size = size.max(1);
        self
    }
}

/// `(document number, relevance)` pairs from `Doc: n, Relevance: k` lines.
/// Lines that do not follow the format are ignored.
pub fn parse_choice_select(answer: &str, num_choices: usize) -> Vec<(usize, f32)> {
    let mut choices = Vec::new();
    for line in answer.lines() {
        let Some((doc_part, relevance_part)) = line.split_once(',') else {
            continue;
        };
        let doc = doc_part
            .split_once(':')
            .and_then(|(_, n)| n.trim().parse::<usize>().ok());
        let relevance = relevance_part
            .split_once(':')
            .and_then(|(_, r)| r.trim().parse::<f32>().ok());
        match (doc, relevance) {
            (Some(doc), Some(relevance)) if doc >= 1 && doc <= num_choices => {
                if !choices.iter().any(|(d, _)| *d == doc) {
                    choices.push((doc, relevance));
                }
            }
            _ => debug!(line, "Skipping unparsable rerank line"),
        }
    }
    choices
}

#[async_trait]
impl NodePostprocessor for LlmRerank {
    async fn postprocess(
        &self,
        nodes: Vec<NodeWithScore>,
        query: &str,
    ) -> Result<Vec<NodeWithScore>> {
        let mut reranked = Vec::new();
        for batch in nodes.chunks(self.choice_batch_size) {
            let context = batch
                .iter()
                .enumerate()
                .map(|(i, n)| format!("Document {}:\n{}", i + 1, n.get_content(MetadataMode::Llm)))
                .collect::<Vec<_>>()
                .join("\n\n");
            let prompt = prompts::render(
                prompts::CHOICE_SELECT,
                &[("context_str", &context), ("query_str", query)],
            );
            let answer = self.brain.predict(&prompt).await?;
            let choices = parse_choice_select(&answer, batch.len());
            if choices.is_empty() {
                warn!("Reranker picked no documents from a batch");
            }
            for (doc, relevance) in choices {
                let mut node = batch[doc - 1].clone();
                node.score = Some(relevance);
                reranked.push(node);
            }
        }
        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.truncate(self.top_n);
        Ok(reranked)
    }

    fn name(&self) -> &str {
        "llm_rerank"
    }
}
