//! Fixed-size token splitter.

use super::{
    TextSplitter, TransformComponent, default_tokenizer, split_chars, split_keep_separator,
    split_nodes,
};
use crate::error::{RagError, Result};
use crate::schema::Node;
use aisearch_core::TokenCounter;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Splits on a separator (then backup separators, then characters) and packs
/// the pieces into chunks of `chunk_size` tokens with `chunk_overlap` tokens of
/// overlap.
#[derive(Clone)]
pub struct TokenTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
    backup_separators: Vec<String>,
    tokenizer: Arc<TokenCounter>,
}

impl TokenTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap > chunk_size {
            return Err(RagError::invalid_input(format!(
                "chunk overlap ({}) is larger than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator: " ".to_string(),
            backup_separators: vec!["\n".to_string()],
            tokenizer: default_tokenizer(),
        })
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_backup_separators(mut self, separators: Vec<String>) -> Self {
        self.backup_separators = separators;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<TokenCounter>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    fn split(&self, text: &str, chunk_size: usize) -> Vec<String> {
        if self.tokenizer.count(text) <= chunk_size {
            return vec![text.to_string()];
        }
        let mut pieces = Vec::new();
        for sep in std::iter::once(&self.separator).chain(self.backup_separators.iter()) {
            pieces = split_keep_separator(text, sep);
            if pieces.len() > 1 {
                break;
            }
        }
        if pieces.len() <= 1 {
            pieces = split_chars(text);
        }
        if pieces.len() <= 1 {
            return vec![text.to_string()];
        }

        let mut out = Vec::new();
        for piece in pieces {
            if self.tokenizer.count(&piece) <= chunk_size {
                out.push(piece);
            } else {
                out.extend(self.split(&piece, chunk_size));
            }
        }
        out
    }

    fn merge(&self, splits: Vec<String>, chunk_size: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut cur: VecDeque<(String, usize)> = VecDeque::new();
        let mut cur_len = 0usize;

        for split in splits {
            let split_len = self.tokenizer.count(&split);
            if split_len > chunk_size {
                warn!(split_len, chunk_size, "Split larger than chunk size");
            }
            if cur_len + split_len > chunk_size {
                let chunk: String = cur.iter().map(|(t, _)| t.as_str()).collect();
                let chunk = chunk.trim();
                if !chunk.is_empty() {
                    chunks.push(chunk.to_string());
                }
                while cur_len > self.chunk_overlap || (cur_len + split_len > chunk_size && cur_len > 0) {
                    match cur.pop_front() {
                        Some((_, len)) => cur_len -= len,
                        None => break,
                    }
                }
            }
            cur_len += split_len;
            cur.push_back((split, split_len));
        }

        let chunk: String = cur.iter().map(|(t, _)| t.as_str()).collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        chunks
    }
}

impl TextSplitter for TokenTextSplitter {
    fn split_with_size(&self, text: &str, chunk_size: usize) -> Result<Vec<String>> {
        if text.is_empty() {
            return Ok(vec![text.to_string()]);
        }
        let splits = self.split(text, chunk_size);
        Ok(self.merge(splits, chunk_size))
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn tokenizer(&self) -> &TokenCounter {
        &self.tokenizer
    }
}

#[async_trait]
impl TransformComponent for TokenTextSplitter {
    async fn transform(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        split_nodes(self, nodes)
    }

    fn name(&self) -> &str {
        "TokenTextSplitter"
    }
}

impl std::fmt::Debug for TokenTextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenTextSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("separator", &self.separator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characters_over_budget_become_their_own_chunks() {
        let splitter = TokenTextSplitter::new(0, 0).unwrap();
        let chunks = splitter.split_with_size("ab", 0).unwrap();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[test]
    fn test_chunks_bounded_and_overlapping() {
        let splitter = TokenTextSplitter::new(32, 8).unwrap();
        let text = (0..200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = splitter.split_text(&text).unwrap();
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(splitter.tokenizer.count(chunk) <= 32);
        }
        // Consecutive chunks share their boundary words.
        let tail = chunks[0].split_whitespace().last().unwrap();
        assert!(chunks[1].split_whitespace().any(|w| w == tail));
    }

    #[test]
    fn test_backup_separator_used_without_spaces() {
        let splitter = TokenTextSplitter::new(8, 0).unwrap();
        let text = (0..30).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let chunks = splitter.split_text(&text).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.starts_with('\n')));
    }

    #[test]
    fn test_small_text_untouched() {
        let splitter = TokenTextSplitter::new(512, 128).unwrap();
        assert_eq!(
            splitter.split_text("Uber 2019 annual report").unwrap(),
            vec!["Uber 2019 annual report"]
        );
    }
}
