//! Fitting retrieved text into the model's context window.

use crate::error::{RagError, Result};
use crate::node_parser::{TextSplitter, TokenTextSplitter};
use aisearch_core::TokenCounter;
use std::sync::Arc;

pub const DEFAULT_NUM_OUTPUT: usize = 256;
pub const DEFAULT_CHUNK_OVERLAP_RATIO: f32 = 0.1;
const PADDING: usize = 5;

/// Token budget for a prompt: the context window minus the template and the
/// tokens reserved for the answer.
#[derive(Debug, Clone)]
pub struct PromptHelper {
    context_window: usize,
    num_output: usize,
    chunk_overlap_ratio: f32,
    tokenizer: Arc<TokenCounter>,
}

impl PromptHelper {
    pub fn new(context_window: usize, num_output: usize, tokenizer: Arc<TokenCounter>) -> Self {
        Self {
            context_window,
            num_output,
            chunk_overlap_ratio: DEFAULT_CHUNK_OVERLAP_RATIO,
            tokenizer,
        }
    }

    pub fn with_chunk_overlap_ratio(mut self, ratio: f32) -> Self {
        self.chunk_overlap_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    pub fn num_output(&self) -> usize {
        self.num_output
    }

    /// Tokens left per chunk when `num_chunks` chunks share a prompt whose
    /// fixed part is `empty_prompt`.
    pub fn available_chunk_size(&self, empty_prompt: &str, num_chunks: usize) -> Result<usize> {
        let prompt_tokens = self.tokenizer.count(empty_prompt);
        let available = self
            .context_window
            .saturating_sub(prompt_tokens + self.num_output)
            / num_chunks.max(1);
        if available <= PADDING {
            return Err(RagError::invalid_input(format!(
                "prompt of {} tokens plus {} output tokens does not fit a context window of {}",
                prompt_tokens, self.num_output, self.context_window
            )));
        }
        Ok(available - PADDING)
    }

    fn splitter(&self, chunk_size: usize) -> Result<TokenTextSplitter> {
        let overlap = (chunk_size as f32 * self.chunk_overlap_ratio) as usize;
        Ok(TokenTextSplitter::new(chunk_size, overlap)?
            .with_separator(" ")
            .with_tokenizer(self.tokenizer.clone()))
    }

    /// Join `chunks` and re-split them into as few pieces as fit `empty_prompt`.
    pub fn repack(&self, empty_prompt: &str, chunks: &[String]) -> Result<Vec<String>> {
        let chunk_size = self.available_chunk_size(empty_prompt, 1)?;
        let combined = chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if combined.is_empty() {
            return Ok(Vec::new());
        }
        self.splitter(chunk_size)?.split_text(&combined)
    }

    /// Cut each chunk to an equal share of the budget so all of them fit one prompt.
    pub fn truncate(&self, empty_prompt: &str, chunks: &[String]) -> Result<Vec<String>> {
        let chunk_size = self.available_chunk_size(empty_prompt, chunks.len())?;
        let splitter = self.splitter(chunk_size)?;
        let mut out = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if let Some(first) = splitter.split_text(chunk)?.into_iter().next() {
                out.push(first);
            }
        }
        Ok(out)
    }
}
