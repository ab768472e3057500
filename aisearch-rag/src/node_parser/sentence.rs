//! Sentence-aware splitter.
//!
//! Text is split paragraph, then sentence, then clause, then word, then
//! character until every piece fits the chunk size, and pieces are merged back
//! into chunks with a token overlap between neighbours.

use super::{
    TextSplitter, TransformComponent, default_tokenizer, split_chars, split_clauses,
    split_keep_separator, split_nodes, split_sentences,
};
use crate::error::{RagError, Result};
use crate::schema::Node;
use aisearch_core::TokenCounter;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_PARAGRAPH_SEPARATOR: &str = "\n\n\n";

#[derive(Debug, Clone)]
struct Split {
    text: String,
    is_sentence: bool,
    token_size: usize,
}

/// Splits text into chunks that respect sentence boundaries where possible.
#[derive(Clone)]
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
    paragraph_separator: String,
    tokenizer: Arc<TokenCounter>,
}

impl SentenceSplitter {
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
            paragraph_separator: DEFAULT_PARAGRAPH_SEPARATOR.to_string(),
            tokenizer: default_tokenizer(),
        })
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_paragraph_separator(mut self, separator: impl Into<String>) -> Self {
        self.paragraph_separator = separator.into();
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<TokenCounter>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn split(&self, text: &str, chunk_size: usize) -> Vec<Split> {
        let token_size = self.tokenizer.count(text);
        if token_size <= chunk_size {
            return vec![Split {
                text: text.to_string(),
                is_sentence: true,
                token_size,
            }];
        }

        let (pieces, is_sentence) = self.split_once(text);
        if pieces.len() <= 1 {
            // A single character over the budget stays whole.
            return vec![Split {
                text: text.to_string(),
                is_sentence: false,
                token_size,
            }];
        }
        let mut out = Vec::new();
        for piece in pieces {
            let size = self.tokenizer.count(&piece);
            if size <= chunk_size {
                out.push(Split {
                    text: piece,
                    is_sentence,
                    token_size: size,
                });
            } else {
                out.extend(self.split(&piece, chunk_size));
            }
        }
        out
    }

    /// First splitting level that actually divides the text.
    fn split_once(&self, text: &str) -> (Vec<String>, bool) {
        let paragraphs = split_keep_separator(text, &self.paragraph_separator);
        if paragraphs.len() > 1 {
            return (paragraphs, true);
        }
        let sentences = split_sentences(text);
        if sentences.len() > 1 {
            return (sentences, true);
        }
        let clauses = split_clauses(text);
        if clauses.len() > 1 {
            return (clauses, false);
        }
        let words = split_keep_separator(text, &self.separator);
        if words.len() > 1 {
            return (words, false);
        }
        (split_chars(text), false)
    }

    fn merge(&self, splits: Vec<Split>, chunk_size: usize) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut cur_chunk: Vec<(String, usize)> = Vec::new();
        let mut cur_len = 0usize;
        let mut new_chunk = true;

        let mut close_chunk = |cur_chunk: &mut Vec<(String, usize)>,
                               cur_len: &mut usize,
                               new_chunk: &mut bool| {
            chunks.push(cur_chunk.iter().map(|(t, _)| t.as_str()).collect());
            let last_chunk = std::mem::take(cur_chunk);
            *cur_len = 0;
            *new_chunk = true;
            for (text, len) in last_chunk.into_iter().rev() {
                if *cur_len + len > self.chunk_overlap {
                    break;
                }
                *cur_len += len;
                cur_chunk.insert(0, (text, len));
            }
        };

        let mut queue = splits.into_iter().peekable();
        while let Some(split) = queue.peek() {
            if cur_len + split.token_size > chunk_size && !new_chunk {
                close_chunk(&mut cur_chunk, &mut cur_len, &mut new_chunk);
            } else if split.is_sentence || cur_len + split.token_size <= chunk_size || new_chunk {
                cur_len += split.token_size;
                cur_chunk.push((split.text.clone(), split.token_size));
                queue.next();
                new_chunk = false;
            } else {
                close_chunk(&mut cur_chunk, &mut cur_len, &mut new_chunk);
            }
        }
        if !new_chunk {
            chunks.push(cur_chunk.iter().map(|(t, _)| t.as_str()).collect());
        }

        chunks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

impl TextSplitter for SentenceSplitter {
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
impl TransformComponent for SentenceSplitter {
    async fn transform(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        split_nodes(self, nodes)
    }

    fn name(&self) -> &str {
        "SentenceSplitter"
    }
}

impl std::fmt::Debug for SentenceSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Document;

    fn essay() -> String {
        (0..40)
            .map(|i| format!("Sentence number {i} talks about painting and programming."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_characters_over_budget_become_their_own_chunks() {
        let splitter = SentenceSplitter::new(0, 0).unwrap();
        let chunks = splitter.split_with_size("ab", 0).unwrap();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = SentenceSplitter::new(512, 50).unwrap();
        let chunks = splitter.split_text("One sentence. Two sentences.").unwrap();
        assert_eq!(chunks, vec!["One sentence. Two sentences."]);
    }

    #[test]
    fn test_chunks_respect_size_and_sentences() {
        let splitter = SentenceSplitter::new(64, 16).unwrap();
        let chunks = splitter.split_text(&essay()).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(splitter.tokenizer.count(chunk) <= 64, "chunk too big: {chunk}");
            assert!(chunk.ends_with('.'), "chunk cut mid-sentence: {chunk}");
        }
    }

    #[test]
    fn test_overlap_repeats_tail_sentence() {
        let splitter = SentenceSplitter::new(64, 16).unwrap();
        let chunks = splitter.split_text(&essay()).unwrap();
        let last_sentence_of_first = chunks[0].rsplit(". ").next().unwrap();
        assert!(chunks[1].starts_with(last_sentence_of_first.trim_end_matches('.')));
    }

    #[test]
    fn test_long_word_run_falls_back_to_words() {
        let splitter = SentenceSplitter::new(20, 0).unwrap();
        let text = "word ".repeat(100);
        let chunks = splitter.split_text(&text).unwrap();
        assert!(chunks.len() >= 5);
        assert!(chunks.iter().all(|c| splitter.tokenizer.count(c) <= 20));
    }

    #[test]
    fn test_overlap_larger_than_size_rejected() {
        assert!(SentenceSplitter::new(10, 20).is_err());
    }

    #[test]
    fn test_metadata_longer_than_chunk_is_error() {
        let splitter = SentenceSplitter::new(8, 0).unwrap();
        let long_meta = "title: a very long document title that keeps going and going";
        assert!(splitter.split_text_metadata_aware("text", long_meta).is_err());
    }

    #[tokio::test]
    async fn test_transform_links_children() {
        let splitter = SentenceSplitter::new(64, 0).unwrap();
        let doc = Document::new(essay()).with_metadata("file_name", "essay.txt");
        let nodes = splitter
            .transform(vec![Node::from_document(&doc)])
            .await
            .unwrap();
        assert!(nodes.len() > 1);
        assert!(nodes.iter().all(|n| n.ref_doc_id.as_deref() == Some(doc.id.as_str())));
        assert_eq!(nodes[0].next_id.as_deref(), Some(nodes[1].id.as_str()));
        assert_eq!(nodes[0].start_char, Some(0));
    }
}
