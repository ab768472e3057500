use super::{DEFAULT_NUM_WORKERS, MetadataExtractor, run_prompts};
use crate::error::Result;
use crate::prompts;
use crate::schema::{Metadata, MetadataMode, Node};
use aisearch_core::Brain;
use async_trait::async_trait;

/// `questions_this_excerpt_can_answer`.
pub struct QuestionsAnsweredExtractor {
    brain: Brain,
    questions: usize,
    workers: usize,
}

impl QuestionsAnsweredExtractor {
    pub fn new(brain: Brain, questions: usize) -> Self {
        Self {
            brain,
            questions: questions.max(1),
            workers: DEFAULT_NUM_WORKERS,
        }
    }
}

#[async_trait]
impl MetadataExtractor for QuestionsAnsweredExtractor {
    async fn extract(&self, nodes: &[Node]) -> Result<Vec<Metadata>> {
        let num_questions = self.questions.to_string();
        let requests = nodes
            .iter()
            .map(|n| {
                prompts::render(
                    prompts::QUESTIONS_ANSWERED,
                    &[
                        ("context_str", &n.get_content(MetadataMode::All)),
                        ("num_questions", &num_questions),
                    ],
                )
            })
            .collect();
        let answers = run_prompts(&self.brain, requests, self.workers).await?;
        Ok(answers
            .into_iter()
            .map(|a| Metadata::from([("questions_this_excerpt_can_answer".to_string(), a)]))
            .collect())
    }

    fn name(&self) -> &str {
        "QuestionsAnsweredExtractor"
    }
}
