//! Documents, nodes and scored nodes.
//!
//! A `Document` is what a reader produces: the full text of a file (or of one
//! PDF page) plus file metadata. Node parsers cut documents into `Node`s that
//! inherit the metadata and keep a link back to their source document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type Metadata = BTreeMap<String, String>;

/// Which metadata keys are rendered in front of a node's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Every key.
    All,
    /// Keys not excluded for the LLM.
    Llm,
    /// Keys not excluded for embedding.
    Embed,
    /// Text only.
    None,
}

/// A loaded source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub excluded_llm_metadata_keys: Vec<String>,
    #[serde(default)]
    pub excluded_embed_metadata_keys: Vec<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            metadata: Metadata::new(),
            excluded_llm_metadata_keys: Vec::new(),
            excluded_embed_metadata_keys: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A chunk of a document, the unit that gets embedded, indexed and retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_doc_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub excluded_llm_metadata_keys: Vec<String>,
    #[serde(default)]
    pub excluded_embed_metadata_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_char: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_char: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<String>,
}

impl Node {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ref_doc_id: None,
            text: text.into(),
            metadata: Metadata::new(),
            excluded_llm_metadata_keys: Vec::new(),
            excluded_embed_metadata_keys: Vec::new(),
            embedding: None,
            start_char: None,
            end_char: None,
            prev_id: None,
            next_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A single node covering the whole document.
    pub fn from_document(doc: &Document) -> Self {
        let mut node = Node::new(doc.text.clone());
        node.ref_doc_id = Some(doc.id.clone());
        node.metadata = doc.metadata.clone();
        node.excluded_llm_metadata_keys = doc.excluded_llm_metadata_keys.clone();
        node.excluded_embed_metadata_keys = doc.excluded_embed_metadata_keys.clone();
        node.start_char = Some(0);
        node.end_char = Some(doc.text.chars().count());
        node
    }

    /// A new node for a piece of this node's text, inheriting its metadata.
    pub fn child(&self, text: impl Into<String>, start_char: Option<usize>) -> Node {
        let text = text.into();
        let mut node = Node::new(text);
        node.ref_doc_id = self.ref_doc_id.clone().or_else(|| Some(self.id.clone()));
        node.metadata = self.metadata.clone();
        node.excluded_llm_metadata_keys = self.excluded_llm_metadata_keys.clone();
        node.excluded_embed_metadata_keys = self.excluded_embed_metadata_keys.clone();
        node.start_char = start_char;
        node.end_char = start_char.map(|s| s + node.text.chars().count());
        node
    }

    fn is_excluded(&self, key: &str, mode: MetadataMode) -> bool {
        match mode {
            MetadataMode::All => false,
            MetadataMode::Llm => self.excluded_llm_metadata_keys.iter().any(|k| k == key),
            MetadataMode::Embed => self.excluded_embed_metadata_keys.iter().any(|k| k == key),
            MetadataMode::None => true,
        }
    }

    /// `key: value` lines for the metadata visible in `mode`.
    pub fn metadata_str(&self, mode: MetadataMode) -> String {
        self.metadata
            .iter()
            .filter(|(k, _)| !self.is_excluded(k, mode))
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text as seen by the LLM or the embedder: metadata block, blank line, text.
    pub fn get_content(&self, mode: MetadataMode) -> String {
        let meta = self.metadata_str(mode);
        if meta.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", meta, self.text)
        }
    }
}

/// Set prev/next links between consecutive nodes of the same source document.
pub fn link_siblings(nodes: &mut [Node]) {
    for i in 1..nodes.len() {
        if nodes[i].ref_doc_id.is_some() && nodes[i].ref_doc_id == nodes[i - 1].ref_doc_id {
            let prev_id = nodes[i - 1].id.clone();
            let next_id = nodes[i].id.clone();
            nodes[i].prev_id = Some(prev_id);
            nodes[i - 1].next_id = Some(next_id);
        }
    }
}

/// A retrieved node with its similarity or relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: Option<f32>,
}

impl NodeWithScore {
    pub fn new(node: Node, score: Option<f32>) -> Self {
        Self { node, score }
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn text(&self) -> &str {
        &self.node.text
    }

    pub fn get_content(&self, mode: MetadataMode) -> String {
        self.node.get_content(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Node {
        let mut node = Node::new("Uber spent more on R&D.")
            .with_metadata("file_name", "uber_10k.pdf")
            .with_metadata("page_label", "65")
            .with_metadata("excerpt_keywords", "uber, r&d");
        node.excluded_llm_metadata_keys = vec!["excerpt_keywords".into()];
        node.excluded_embed_metadata_keys = vec!["file_name".into()];
        node
    }

    #[test]
    fn test_get_content_per_mode() {
        let node = sample();
        assert_eq!(
            node.get_content(MetadataMode::Llm),
            "file_name: uber_10k.pdf\npage_label: 65\n\nUber spent more on R&D."
        );
        assert_eq!(
            node.get_content(MetadataMode::Embed),
            "excerpt_keywords: uber, r&d\npage_label: 65\n\nUber spent more on R&D."
        );
        assert_eq!(node.get_content(MetadataMode::None), "Uber spent more on R&D.");
        assert_eq!(node.get_content(MetadataMode::All).lines().count(), 5);
    }

    #[test]
    fn test_child_inherits_metadata_and_ref() {
        let doc = Document::new("abc def").with_metadata("file_name", "a.txt");
        let parent = Node::from_document(&doc);
        let child = parent.child("def", Some(4));
        assert_eq!(child.ref_doc_id.as_deref(), Some(doc.id.as_str()));
        assert_eq!(child.metadata.get("file_name").map(String::as_str), Some("a.txt"));
        assert_eq!(child.start_char, Some(4));
        assert_eq!(child.end_char, Some(7));
        assert_ne!(child.id, parent.id);
    }

    #[test]
    fn test_link_siblings_only_within_document() {
        let a = Document::new("a");
        let b = Document::new("b");
        let mut nodes = vec![
            Node::from_document(&a),
            Node::from_document(&a),
            Node::from_document(&b),
        ];
        link_siblings(&mut nodes);
        assert_eq!(nodes[0].next_id.as_deref(), Some(nodes[1].id.as_str()));
        assert_eq!(nodes[1].prev_id.as_deref(), Some(nodes[0].id.as_str()));
        assert!(nodes[1].next_id.is_none());
        assert!(nodes[2].prev_id.is_none());
    }
}
