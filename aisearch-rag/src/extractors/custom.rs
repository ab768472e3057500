use super::MetadataExtractor;
use crate::error::{RagError, Result};
use crate::schema::{Metadata, Node};
use async_trait::async_trait;

/// `custom`: the document title and the excerpt keywords on two lines.
/// Runs after the title and keyword extractors.
#[derive(Debug, Default)]
pub struct CustomExtractor;

fn required<'a>(node: &'a Node, key: &str) -> Result<&'a str> {
    node.metadata.get(key).map(String::as_str).ok_or_else(|| {
        RagError::invalid_input(format!("node {} has no '{}' metadata", node.id, key))
    })
}

#[async_trait]
impl MetadataExtractor for CustomExtractor {
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>> {
        nodes
            .iter()
            .map(|n| {
                let custom = format!(
                    "{}\n{}",
                    required(n, "document_title")?,
                    required(n, "excerpt_keywords")?
                );
                Ok(Metadata::from([("custom".to_string(), custom)]))
            })
            .collect()
    }

    fn name(&self) -> &str {
        "CustomExtractor"
    }
}
