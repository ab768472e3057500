//! Response synthesis: turning retrieved nodes into an answer.

pub mod prompt_helper;

pub use prompt_helper::{DEFAULT_NUM_OUTPUT, PromptHelper};

use crate::error::Result;
use crate::prompts;
use crate::schema::{MetadataMode, NodeWithScore};
use aisearch_core::Brain;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const EMPTY_RESPONSE: &str = "Empty Response";

/// How retrieved chunks are combined into an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Pack chunks into as few prompts as possible, then refine across them.
    #[default]
    Compact,
    /// Answer from the first chunk, then refine the answer with each next chunk.
    Refine,
    /// Summarise packed chunks and recurse over the summaries until one remains.
    TreeSummarize,
    /// Truncate every chunk so all fit a single prompt.
    SimpleSummarize,
}

/// An answer with the nodes it was built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub response: String,
    pub source_nodes: Vec<NodeWithScore>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Response {
    pub fn new(response: impl Into<String>, source_nodes: Vec<NodeWithScore>) -> Self {
        Self {
            response: response.into(),
            source_nodes,
            metadata: BTreeMap::new(),
        }
    }

    /// Source texts, each cut to `length` characters.
    pub fn formatted_sources(&self, length: usize) -> String {
        self.source_nodes
            .iter()
            .map(|n| {
                let text: String = n.text().chars().take(length).collect();
                format!("> Source (Node id: {}): {}...", n.id(), text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}

#[derive(Debug, Clone)]
pub struct ResponseSynthesizer {
    brain: Brain,
    mode: ResponseMode,
    prompt_helper: PromptHelper,
    text_qa_template: String,
    refine_template: String,
    summary_template: String,
    use_async: bool,
}

impl ResponseSynthesizer {
    pub fn new(brain: Brain, mode: ResponseMode) -> Self {
        let prompt_helper = PromptHelper::new(
            brain.context_window(),
            DEFAULT_NUM_OUTPUT,
            brain.token_counter().clone(),
        );
        Self {
            brain,
            mode,
            prompt_helper,
            text_qa_template: prompts::TEXT_QA.to_string(),
            refine_template: prompts::REFINE.to_string(),
            summary_template: prompts::TREE_SUMMARIZE.to_string(),
            use_async: false,
        }
    }

    pub fn with_prompt_helper(mut self, prompt_helper: PromptHelper) -> Self {
        self.prompt_helper = prompt_helper;
        self
    }

    pub fn with_text_qa_template(mut self, template: impl Into<String>) -> Self {
        self.text_qa_template = template.into();
        self
    }

    pub fn with_refine_template(mut self, template: impl Into<String>) -> Self {
        self.refine_template = template.into();
        self
    }

    pub fn with_summary_template(mut self, template: impl Into<String>) -> Self {
        self.summary_template = template.into();
        self
    }

    /// Summarise tree levels concurrently.
    pub fn use_async(mut self, use_async: bool) -> Self {
        self.use_async = use_async;
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Answer `query` from `nodes`, rendered as the LLM sees them.
    pub async fn synthesize(&self, query: &str, nodes: Vec<NodeWithScore>) -> Result<Response> {
        if nodes.is_empty() {
            return Ok(Response::new(EMPTY_RESPONSE, nodes));
        }
        let chunks: Vec<String> = nodes
            .iter()
            .map(|n| n.get_content(MetadataMode::Llm))
            .collect();
        let answer = self.get_response(query, &chunks).await?;
        Ok(Response::new(answer, nodes))
    }

    /// Answer `query` from raw text chunks.
    pub async fn get_response(&self, query: &str, chunks: &[String]) -> Result<String> {
        if chunks.iter().all(|c| c.trim().is_empty()) {
            return Ok(EMPTY_RESPONSE.to_string());
        }
        debug!(mode = ?self.mode, chunks = chunks.len(), "Synthesizing response");
        match self.mode {
            ResponseMode::Compact => {
                let qa = self.empty_prompt(&self.text_qa_template, query);
                let refine = self.empty_prompt(&self.refine_template, query);
                let widest = if self.brain.count_tokens(&qa) >= self.brain.count_tokens(&refine) {
                    qa
                } else {
                    refine
                };
                let packed = self.prompt_helper.repack(&widest, chunks)?;
                self.refine(query, &packed).await
            }
            ResponseMode::Refine => self.refine(query, chunks).await,
            ResponseMode::TreeSummarize => self.tree_summarize(query, chunks.to_vec()).await,
            ResponseMode::SimpleSummarize => {
                let empty = self.empty_prompt(&self.text_qa_template, query);
                let truncated = self.prompt_helper.truncate(&empty, chunks)?;
                let prompt = prompts::render(
                    &self.text_qa_template,
                    &[("context_str", &truncated.join("\n\n")), ("query_str", query)],
                );
                Ok(self.brain.predict(&prompt).await?)
            }
        }
    }

    /// A template with the query filled in and no context, for budgeting.
    fn empty_prompt(&self, template: &str, query: &str) -> String {
        prompts::render(
            template,
            &[
                ("query_str", query),
                ("context_str", ""),
                ("context_msg", ""),
                ("existing_answer", ""),
            ],
        )
    }

    async fn refine(&self, query: &str, chunks: &[String]) -> Result<String> {
        let mut answer: Option<String> = None;
        for chunk in chunks {
            let template = if answer.is_none() {
                &self.text_qa_template
            } else {
                &self.refine_template
            };
            let empty = self.empty_prompt(template, query);
            for piece in self.prompt_helper.repack(&empty, std::slice::from_ref(chunk))? {
                answer = Some(match answer.take() {
                    None => {
                        let prompt = prompts::render(
                            &self.text_qa_template,
                            &[("context_str", &piece), ("query_str", query)],
                        );
                        self.brain.predict(&prompt).await?
                    }
                    Some(existing) => self.refine_once(query, &existing, &piece).await?,
                });
            }
        }
        Ok(answer.unwrap_or_else(|| EMPTY_RESPONSE.to_string()))
    }

    async fn refine_once(&self, query: &str, existing: &str, context: &str) -> Result<String> {
        let prompt = prompts::render(
            &self.refine_template,
            &[
                ("query_str", query),
                ("existing_answer", existing),
                ("context_msg", context),
            ],
        );
        Ok(self.brain.predict(&prompt).await?)
    }

    async fn tree_summarize(&self, query: &str, chunks: Vec<String>) -> Result<String> {
        let empty = self.empty_prompt(&self.summary_template, query);
        let mut level = chunks;
        loop {
            let packed = self.prompt_helper.repack(&empty, &level)?;
            let batch: Vec<String> = packed
                .iter()
                .map(|c| {
                    prompts::render(
                        &self.summary_template,
                        &[("context_str", c), ("query_str", query)],
                    )
                })
                .collect();
            if batch.len() <= 1 {
                let Some(prompt) = batch.into_iter().next() else {
                    return Ok(EMPTY_RESPONSE.to_string());
                };
                return Ok(self.brain.predict(&prompt).await?);
            }
            debug!(chunks = batch.len(), "Summarizing tree level");
            level = if self.use_async {
                try_join_all(batch.iter().map(|p| self.brain.predict(p))).await?
            } else {
                let mut summaries = Vec::with_capacity(batch.len());
                for prompt in &batch {
                    summaries.push(self.brain.predict(prompt).await?);
                }
                summaries
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Node;
    use aisearch_core::MockLlmProvider;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn nodes(texts: &[&str]) -> Vec<NodeWithScore> {
        texts
            .iter()
            .map(|t| NodeWithScore::new(Node::new(*t), Some(1.0)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_llm() {
        let provider = Arc::new(MockLlmProvider::new());
        let synth = ResponseSynthesizer::new(Brain::new(provider.clone()), ResponseMode::Compact);
        let response = synth.synthesize("q", Vec::new()).await.unwrap();
        assert_eq!(response.to_string(), EMPTY_RESPONSE);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_compact_packs_into_one_call() {
        let provider = Arc::new(MockLlmProvider::with_response("He painted."));
        let synth = ResponseSynthesizer::new(Brain::new(provider.clone()), ResponseMode::Compact);
        let response = synth
            .synthesize("What did he do?", nodes(&["He wrote.", "He painted."]))
            .await
            .unwrap();

        assert_eq!(response.response, "He painted.");
        assert_eq!(response.source_nodes.len(), 2);
        assert_eq!(provider.request_count(), 1);
        let prompt = provider.prompt_at(0).unwrap();
        assert!(prompt.contains("He wrote.\n\nHe painted."));
        assert!(prompt.contains("Query: What did he do?"));
    }

    #[tokio::test]
    async fn test_refine_threads_existing_answer() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("first answer");
        provider.queue_text("refined answer");
        let synth = ResponseSynthesizer::new(Brain::new(provider.clone()), ResponseMode::Refine);
        let response = synth
            .synthesize("q", nodes(&["chunk one", "chunk two"]))
            .await
            .unwrap();

        assert_eq!(response.response, "refined answer");
        let second = provider.prompt_at(1).unwrap();
        assert!(second.contains("We have provided an existing answer: first answer"));
        assert!(second.contains("chunk two"));
    }

    #[tokio::test]
    async fn test_tree_summarize_recurses_over_summaries() {
        let provider = Arc::new(MockLlmProvider::with_response("summary").with_context_window(400));
        let synth = ResponseSynthesizer::new(
            Brain::new(provider.clone()),
            ResponseMode::TreeSummarize,
        )
        .use_async(true);
        let long = "word ".repeat(120);
        let response = synth
            .synthesize("q", nodes(&[&long, &long, &long]))
            .await
            .unwrap();

        assert_eq!(response.response, "summary");
        assert!(provider.request_count() >= 3, "one call per packed chunk plus the root");
        let last = provider.prompt_at(provider.request_count() - 1).unwrap();
        assert!(last.contains("summary\n\nsummary"));
    }

    #[tokio::test]
    async fn test_simple_summarize_single_call() {
        let provider = Arc::new(MockLlmProvider::with_response("ok"));
        let synth =
            ResponseSynthesizer::new(Brain::new(provider.clone()), ResponseMode::SimpleSummarize);
        synth
            .synthesize("q", nodes(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(provider.request_count(), 1);
    }

    #[test]
    fn test_formatted_sources() {
        let response = Response::new(
            "answer",
            vec![NodeWithScore::new(Node::new("abcdef").with_id("n1"), None)],
        );
        assert_eq!(response.formatted_sources(3), "> Source (Node id: n1): abc...");
    }
}
