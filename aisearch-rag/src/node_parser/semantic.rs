//! Semantic chunking.
//!
//! Sentences are embedded together with `buffer_size` neighbours on each side.
//! A chunk boundary is placed wherever the cosine distance between consecutive
//! sentence windows exceeds the given percentile of all such distances.

use super::{TransformComponent, build_nodes_from_splits, split_sentences};
use crate::error::Result;
use crate::schema::Node;
use aisearch_core::{Embedder, cosine_similarity};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct SemanticSplitter {
    buffer_size: usize,
    breakpoint_percentile_threshold: f32,
    embedder: Arc<dyn Embedder>,
}

impl SemanticSplitter {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            buffer_size: 1,
            breakpoint_percentile_threshold: 95.0,
            embedder,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_breakpoint_percentile(mut self, percentile: f32) -> Self {
        self.breakpoint_percentile_threshold = percentile.clamp(0.0, 100.0);
        self
    }

    /// Sentence windows: each sentence joined with its neighbours.
    fn sentence_windows(&self, sentences: &[String]) -> Vec<String> {
        (0..sentences.len())
            .map(|i| {
                let start = i.saturating_sub(self.buffer_size);
                let end = (i + self.buffer_size + 1).min(sentences.len());
                sentences[start..end].concat()
            })
            .collect()
    }

    /// Split one text into semantically coherent chunks.
    pub async fn split_text(&self, text: &str) -> Result<Vec<String>> {
        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let windows = self.sentence_windows(&sentences);
        let embeddings = self.embedder.embed_batch(&windows).await?;
        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();

        let threshold = percentile(&distances, self.breakpoint_percentile_threshold);
        debug!(
            sentences = sentences.len(),
            threshold, "Computed semantic breakpoint threshold"
        );

        let mut chunks = Vec::new();
        let mut start = 0;
        for (i, distance) in distances.iter().enumerate() {
            if *distance > threshold {
                chunks.push(sentences[start..=i].concat());
                start = i + 1;
            }
        }
        if start < sentences.len() {
            chunks.push(sentences[start..].concat());
        }
        Ok(chunks)
    }
}

/// Percentile with linear interpolation between closest ranks.
pub(crate) fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = pct / 100.0 * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f32)
}

#[async_trait]
impl TransformComponent for SemanticSplitter {
    async fn transform(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        for node in nodes {
            let splits = self.split_text(&node.text).await?;
            out.extend(build_nodes_from_splits(&node, splits));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "SemanticSplitter"
    }
}
