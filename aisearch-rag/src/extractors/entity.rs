use super::{DEFAULT_NUM_WORKERS, MetadataExtractor, run_prompts};
use crate::error::Result;
use crate::prompts;
use crate::schema::{Metadata, MetadataMode, Node};
use aisearch_core::Brain;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedEntity {
    pub entity: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub confidence: f32,
}

/// `entities`: named entities the LLM reports with at least
/// `prediction_threshold` confidence, comma separated.
pub struct EntityExtractor {
    brain: Brain,
    prediction_threshold: f32,
    workers: usize,
}

impl EntityExtractor {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            prediction_threshold: 0.5,
            workers: DEFAULT_NUM_WORKERS,
        }
    }

    pub fn with_prediction_threshold(mut self, threshold: f32) -> Self {
        self.prediction_threshold = threshold;
        self
    }
}

/// Entities from the LLM's JSON answer. Unparsable answers yield none.
pub fn parse_entities(answer: &str) -> Vec<ExtractedEntity> {
    let start = answer.find('[');
    let end = answer.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &answer[s..=e],
        _ => {
            warn!("Entity answer holds no JSON array");
            return Vec::new();
        }
    };
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!(error = %e, "Could not parse entity answer");
        Vec::new()
    })
}

#[async_trait]
impl MetadataExtractor for EntityExtractor {
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>> {
        let requests = nodes
            .iter()
            .map(|n| {
                prompts::render(
                    prompts::ENTITIES,
                    &[("context_str", &n.get_content(MetadataMode::None))],
                )
            })
            .collect();
        let answers = run_prompts(&self.brain, requests, self.workers).await?;

        Ok(answers
            .iter()
            .map(|answer| {
                let mut names: Vec<String> = Vec::new();
                for entity in parse_entities(answer) {
                    let name = entity.entity.trim();
                    if entity.confidence >= self.prediction_threshold
                        && !name.is_empty()
                        && !names.iter().any(|n| n == name)
                    {
                        names.push(name.to_string());
                    }
                }
                let mut metadata = Metadata::new();
                if !names.is_empty() {
                    metadata.insert("entities".into(), names.join(", "));
                }
                metadata
            })
            .collect())
    }

    fn name(&self) -> &str {
        "EntityExtractor"
    }
}
