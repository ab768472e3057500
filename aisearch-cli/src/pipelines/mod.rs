//! Pipeline runners and the state they share.

pub mod agentic;
pub mod basic;
pub mod knowledge_graph;
pub mod metadata;
pub mod semantic;

use crate::display;
use aisearch_core::config::{AppConfig, LlmConfig, PathsConfig};
use aisearch_core::{Brain, CountingEmbedder, Embedder, TokenCountingHandler, create_brain, create_embedder};
use aisearch_rag::{
    Evaluator, FaithfulnessEvaluator, PromptHelper, QueryEngine, RelevancyEvaluator, ResponseMode,
    ResponseSynthesizer, SentenceSplitter,
};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Index id every single-index pipeline persists under.
pub const VECTOR_INDEX_ID: &str = "vector_index";

/// Configuration, models and questions for one run.
pub struct PipelineContext {
    pub config: AppConfig,
    pub paths: PathsConfig,
    pub workspace: PathBuf,
    pub questions: Vec<String>,
    pub load_from_storage: bool,
    pub embedder: Arc<dyn Embedder>,
    pub callbacks: Arc<TokenCountingHandler>,
    brain: OnceLock<Brain>,
}

impl PipelineContext {
    pub fn new(
        config: AppConfig,
        paths: PathsConfig,
        workspace: PathBuf,
        questions: Vec<String>,
        load_from_storage: bool,
    ) -> anyhow::Result<Self> {
        let callbacks = Arc::new(TokenCountingHandler::new());
        let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::new(
            create_embedder(&config.embedding, config.llm.resolve_api_key()),
            callbacks.clone(),
        ));
        Ok(Self {
            config,
            paths,
            workspace,
            questions,
            load_from_storage,
            embedder,
            callbacks,
            brain: OnceLock::new(),
        })
    }

    /// The configured generation model, connected on first use.
    pub fn brain(&self) -> anyhow::Result<Brain> {
        if let Some(brain) = self.brain.get() {
            return Ok(brain.clone());
        }
        let brain = create_brain(&self.config.llm, self.callbacks.clone())
            .context("creating the LLM provider")?;
        Ok(self.brain.get_or_init(|| brain).clone())
    }

    /// A brain for another model on the same provider, counted with the rest.
    pub fn brain_for(&self, model: &str, temperature: f32, max_tokens: Option<usize>) -> anyhow::Result<Brain> {
        let config = LlmConfig {
            model: model.to_string(),
            temperature,
            max_tokens,
            ..self.config.llm.clone()
        };
        create_brain(&config, self.callbacks.clone())
            .with_context(|| format!("creating the LLM provider for {}", model))
    }

    /// Synthesizer sized by the configured context window and answer budget.
    pub fn synthesizer(&self, brain: Brain, mode: ResponseMode) -> ResponseSynthesizer {
        let helper = PromptHelper::new(
            self.config.settings.context_window,
            self.config.settings.num_output,
            brain.token_counter().clone(),
        );
        ResponseSynthesizer::new(brain, mode).with_prompt_helper(helper)
    }

    /// Sentence splitter with the configured chunk size and overlap.
    pub fn sentence_splitter(&self) -> anyhow::Result<SentenceSplitter> {
        SentenceSplitter::new(
            self.config.settings.chunk_size,
            self.config.settings.chunk_overlap,
        )
        .context("invalid chunk settings")
    }

    /// A configured path, resolved against the workspace when relative.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    pub fn store_dir(&self, name: &str) -> PathBuf {
        self.paths.storage_dir.join(name)
    }

    pub fn log_token_usage(&self) {
        let totals = self.callbacks.totals();
        info!(
            prompt_tokens = totals.prompt_tokens,
            completion_tokens = totals.completion_tokens,
            total_llm_tokens = totals.total_llm_tokens(),
            embedding_tokens = totals.embedding_tokens,
            llm_calls = totals.llm_calls,
            embedding_calls = totals.embedding_calls,
            "Token usage"
        );
    }
}

/// Ask every question and print the answers.
pub async fn answer_questions(ctx: &PipelineContext, engine: &dyn QueryEngine) -> anyhow::Result<()> {
    for question in &ctx.questions {
        let response = engine.query(question).await?;
        display::print_answer(question, &response);
        println!();
    }
    Ok(())
}

/// Ask every question, then judge each answer for faithfulness and relevancy.
pub async fn answer_and_evaluate(ctx: &PipelineContext, engine: &dyn QueryEngine) -> anyhow::Result<()> {
    let faithfulness = FaithfulnessEvaluator::new(ctx.brain()?);
    let relevancy = RelevancyEvaluator::new(ctx.brain()?);
    for question in &ctx.questions {
        let response = engine.query(question).await?;
        display::print_answer(question, &response);

        let faithful = faithfulness.evaluate_response(question, &response).await?;
        display::print_evaluation("Evaluating Response Faithfulness", &faithful);
        let relevant = relevancy.evaluate_response(question, &response).await?;
        display::print_evaluation("Evaluating Response Relevancy", &relevant);
        println!("{}", display::SEPARATOR);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = "openai".into();
        config.llm.api_key = None;
        config.llm.base_url = None;
        config.llm.api_key_env = "AISEARCH_TEST_UNSET_KEY".into();
        config.embedding.provider = "local".into();
        config
    }

    #[test]
    fn test_context_without_api_key_defers_provider_errors() {
        let ctx = PipelineContext::new(
            offline_config(),
            PathsConfig::default(),
            PathBuf::from("."),
            Vec::new(),
            true,
        )
        .unwrap();
        assert_eq!(ctx.embedder.provider_name(), "local");
        let err = ctx.brain().unwrap_err();
        assert!(format!("{err:#}").contains("AISEARCH_TEST_UNSET_KEY"), "{err:#}");
    }

    #[test]
    fn test_brain_is_built_once() {
        let mut config = offline_config();
        config.llm.api_key = Some("sk-test".into());
        let ctx = PipelineContext::new(config, PathsConfig::default(), PathBuf::from("."), Vec::new(), false)
            .unwrap();
        let first = ctx.brain().unwrap();
        let second = ctx.brain().unwrap();
        assert_eq!(first.model_name(), second.model_name());
        assert!(ctx.brain.get().is_some());
    }
}
