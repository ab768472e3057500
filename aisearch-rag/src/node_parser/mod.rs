//! Node parsers: turning documents into retrievable chunks.
//!
//! Every parser is a [`TransformComponent`], the same interface metadata
//! extractors implement, so an ingestion pipeline can chain a splitter with any
//! number of extractors.

pub mod semantic;
pub mod sentence;
pub mod token;

pub use semantic::SemanticSplitter;
pub use sentence::SentenceSplitter;
pub use token::TokenTextSplitter;

use crate::error::{RagError, Result};
use crate::schema::{Document, MetadataMode, Node, link_siblings};
use aisearch_core::TokenCounter;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};

/// A step of an ingestion pipeline.
#[async_trait]
pub trait TransformComponent: Send + Sync {
    async fn transform(&self, nodes: Vec<Node>) -> Result<Vec<Node>>;

    fn name(&self) -> &str;
}

/// Synchronous text splitting shared by the sentence and token splitters.
pub trait TextSplitter: Send + Sync {
    /// Split `text` into chunks of at most `chunk_size` tokens.
    fn split_with_size(&self, text: &str, chunk_size: usize) -> Result<Vec<String>>;

    fn chunk_size(&self) -> usize;

    fn tokenizer(&self) -> &TokenCounter;

    fn split_text(&self, text: &str) -> Result<Vec<String>> {
        self.split_with_size(text, self.chunk_size())
    }

    /// Split leaving room for the metadata block rendered in front of each chunk.
    fn split_text_metadata_aware(&self, text: &str, metadata_str: &str) -> Result<Vec<String>> {
        let metadata_len = self.tokenizer().count(metadata_str);
        let chunk_size = self.chunk_size();
        if metadata_len >= chunk_size {
            return Err(RagError::invalid_input(format!(
                "Metadata length ({}) is longer than chunk size ({}). Increase the chunk size or reduce the metadata.",
                metadata_len, chunk_size
            )));
        }
        let effective = chunk_size - metadata_len;
        if effective < 50 {
            tracing::warn!(
                metadata_len,
                effective,
                "Metadata leaves very little room in each chunk"
            );
        }
        self.split_with_size(text, effective)
    }
}

/// Tokenizer shared by every splitter built with defaults.
pub fn default_tokenizer() -> Arc<TokenCounter> {
    static TOKENIZER: OnceLock<Arc<TokenCounter>> = OnceLock::new();
    TOKENIZER
        .get_or_init(|| Arc::new(TokenCounter::for_model("gpt-3.5-turbo")))
        .clone()
}

/// One node per document.
pub fn nodes_from_documents(documents: &[Document]) -> Vec<Node> {
    documents.iter().map(Node::from_document).collect()
}

/// The longer of the LLM and embed metadata renderings.
pub(crate) fn longest_metadata_str(node: &Node, tokenizer: &TokenCounter) -> String {
    let llm = node.metadata_str(MetadataMode::Llm);
    let embed = node.metadata_str(MetadataMode::Embed);
    if tokenizer.count(&llm) >= tokenizer.count(&embed) {
        llm
    } else {
        embed
    }
}

/// Child nodes for `splits` of `parent`, with char offsets and sibling links.
pub(crate) fn build_nodes_from_splits(parent: &Node, splits: Vec<String>) -> Vec<Node> {
    let mut cursor = 0usize;
    let mut nodes: Vec<Node> = splits
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .map(|split| {
            let start = parent.text[cursor..].find(&split).map(|offset| {
                let byte = cursor + offset;
                cursor = byte;
                parent.text[..byte].chars().count()
            });
            parent.child(split, start)
        })
        .collect();
    link_siblings(&mut nodes);
    nodes
}

/// Apply a synchronous splitter to every node.
pub(crate) fn split_nodes(splitter: &dyn TextSplitter, nodes: Vec<Node>) -> Result<Vec<Node>> {
    let mut out = Vec::new();
    for node in nodes {
        let metadata_str = longest_metadata_str(&node, splitter.tokenizer());
        let splits = splitter.split_text_metadata_aware(&node.text, &metadata_str)?;
        out.extend(build_nodes_from_splits(&node, splits));
    }
    Ok(out)
}

/// Split on `sep`, keeping the separator at the start of each following piece.
pub(crate) fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return vec![text.to_string()];
    }
    let mut parts = text.split(sep);
    let mut out = Vec::new();
    if let Some(first) = parts.next() {
        out.push(first.to_string());
    }
    out.extend(parts.map(|p| format!("{}{}", sep, p)));
    out.retain(|p| !p.is_empty());
    out
}

/// Sentences with their trailing whitespace, so joining them restores `text`.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?' | '。' | '！' | '？');
        if terminal {
            // Closing quotes and brackets belong to the sentence.
            while i + 1 < chars.len() && matches!(chars[i + 1], '"' | '\'' | ')' | ']' | '”' | '’')
            {
                i += 1;
                current.push(chars[i]);
            }
            let followed_by_space = i + 1 < chars.len() && chars[i + 1].is_whitespace();
            if followed_by_space && !is_abbreviation(&current) {
                while i + 1 < chars.len() && chars[i + 1].is_whitespace() {
                    i += 1;
                    current.push(chars[i]);
                }
                sentences.push(std::mem::take(&mut current));
            }
        }
        i += 1;
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

fn is_abbreviation(sentence: &str) -> bool {
    const ABBREVIATIONS: &[&str] = &[
        "mr.", "mrs.", "ms.", "dr.", "prof.", "inc.", "ltd.", "co.", "corp.", "vs.", "v.s.",
        "e.g.", "i.e.", "etc.", "no.", "st.", "jr.", "sr.", "u.s.",
    ];
    let last_word = sentence
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_lowercase();
    ABBREVIATIONS.contains(&last_word.as_str())
        || (last_word.len() == 2 && last_word.starts_with(|c: char| c.is_alphabetic()))
}

/// Clauses ending in light punctuation, the fallback below sentence level.
pub(crate) fn split_clauses(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, ',' | '.' | ';' | '。' | '？' | '！') {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub(crate) fn split_chars(text: &str) -> Vec<String> {
    text.chars().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_keep_separator_roundtrips() {
        let parts = split_keep_separator("a b  c", " ");
        assert_eq!(parts, vec!["a", " b", " ", " c"]);
        assert_eq!(parts.concat(), "a b  c");
    }

    #[test]
    fn test_split_sentences_keeps_whitespace() {
        let text = "I wrote essays. Dr. Smith agreed!  Then what? \"Yes.\" End";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "I wrote essays. ",
                "Dr. Smith agreed!  ",
                "Then what? ",
                "\"Yes.\" ",
                "End"
            ]
        );
        assert_eq!(sentences.concat(), text);
    }

    #[test]
    fn test_split_clauses() {
        assert_eq!(split_clauses("a, b; c"), vec!["a,", " b;", " c"]);
    }

    #[test]
    fn test_build_nodes_offsets() {
        let parent = Node::from_document(&Document::new("héllo world. héllo again."));
        let nodes = build_nodes_from_splits(
            &parent,
            vec!["héllo world.".into(), " ".into(), "héllo again.".into()],
        );
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].start_char, Some(0));
        assert_eq!(nodes[1].start_char, Some(13));
        assert_eq!(nodes[1].end_char, Some(25));
        assert_eq!(nodes[0].next_id.as_deref(), Some(nodes[1].id.as_str()));
    }
}
