//! Metadata-enriched RAG over SEC filings, queried through sub-questions.
//!
//! The same nodes are indexed twice: once stripped down to `page_label` and
//! `file_name`, once with everything the extractors added. Both indexes sit
//! behind a sub-question engine so the answers can be compared side by side.

use super::PipelineContext;
use aisearch_core::Brain;
use aisearch_core::config::FilingSource;
use aisearch_rag::extractors::{
    CustomExtractor, EntityExtractor, KeywordExtractor, QuestionsAnsweredExtractor,
    SummaryExtractor, SummaryKind, TitleExtractor,
};
use aisearch_rag::readers;
use aisearch_rag::{
    Document, IngestionPipeline, LlmQuestionGenerator, MetadataMode, Node,
    QueryEngine, QueryEngineTool, ResponseMode, SubQuestionQueryEngine, TokenTextSplitter, Tool,
    TransformComponent, VectorStoreIndex,
};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const TOOL_NAME: &str = "sec_filing_documents";
pub const QUESTION_PREFIX: &str = "Follow the example, but instead of giving a question, always prefix the question with: 'By first identifying and quoting the most relevant sources, '.\n";
const KEPT_KEYS: &[&str] = &["page_label", "file_name"];
const PREVIEW_NODE: usize = 9;

/// Pages of `pages` that fall in `ranges`, in range order. Ranges are
/// clamped to the page count.
pub fn select_pages(pages: Vec<Document>, ranges: &[(usize, usize)]) -> Vec<Document> {
    let mut selected = Vec::new();
    for &(start, end) in ranges {
        let end = end.min(pages.len());
        if start < end {
            selected.extend(pages[start..end].iter().cloned());
        }
    }
    selected
}

/// Copies of `nodes` with every metadata key but `page_label` and `file_name` dropped.
pub fn strip_metadata(nodes: &[Node]) -> Vec<Node> {
    nodes
        .iter()
        .cloned()
        .map(|mut node| {
            node.metadata.retain(|k, _| KEPT_KEYS.contains(&k.as_str()));
            node
        })
        .collect()
}

fn transformations(
    ctx: &PipelineContext,
    brain: &Brain,
    custom: bool,
) -> anyhow::Result<Vec<Arc<dyn TransformComponent>>> {
    let settings = &ctx.config.metadata;
    let mut steps: Vec<Arc<dyn TransformComponent>> = vec![
        Arc::new(TokenTextSplitter::new(settings.chunk_size, settings.chunk_overlap)?.with_separator(" ")),
        Arc::new(TitleExtractor::new(brain.clone(), 5)),
        Arc::new(QuestionsAnsweredExtractor::new(brain.clone(), 1)),
        Arc::new(EntityExtractor::new(brain.clone()).with_prediction_threshold(0.5)),
        Arc::new(SummaryExtractor::new(
            brain.clone(),
            vec![SummaryKind::Prev, SummaryKind::SelfSummary],
        )),
        Arc::new(KeywordExtractor::new(brain.clone(), 5)),
    ];
    if custom {
        steps.push(Arc::new(CustomExtractor));
    }
    Ok(steps)
}

/// Pages of the filing at `path` that fall in `ranges`. A filing that cannot
/// be read, or a selection with no pages, is an error.
pub async fn load_filing(path: &Path, ranges: &[(usize, usize)]) -> anyhow::Result<Vec<Document>> {
    let pages = readers::load_file(path)
        .await
        .with_context(|| format!("reading filing {}", path.display()))?;
    let total = pages.len();
    let documents = select_pages(pages, ranges);
    if documents.is_empty() {
        anyhow::bail!(
            "page ranges {:?} select nothing from {} ({} pages)",
            ranges,
            path.display(),
            total
        );
    }
    info!(file = %path.display(), pages = documents.len(), total, "Selected filing pages");
    Ok(documents)
}

async fn ingest(
    ctx: &PipelineContext,
    source: &FilingSource,
    pipeline: &IngestionPipeline,
) -> anyhow::Result<Vec<Node>> {
    let documents = load_filing(&ctx.resolve(&source.path), &source.page_ranges).await?;
    Ok(pipeline.run(&documents).await?)
}

fn preview(label: &str, nodes: &[Node]) {
    match nodes.get(PREVIEW_NODE) {
        Some(node) => println!("LLM sees ({}):\n {}", label, node.get_content(MetadataMode::Llm)),
        None => warn!(nodes = nodes.len(), "Fewer nodes than the preview index"),
    }
}

async fn sub_question_engine(
    ctx: &PipelineContext,
    nodes: Vec<Node>,
    answer_brain: Brain,
    question_brain: &Brain,
    description: &str,
) -> anyhow::Result<SubQuestionQueryEngine> {
    let index = VectorStoreIndex::build(nodes, ctx.embedder.clone()).await?;
    let engine = index
        .as_query_engine(
            answer_brain.clone(),
            ctx.config.metadata.similarity_top_k,
            ResponseMode::Compact,
        )
        .with_synthesizer(ctx.synthesizer(answer_brain, ResponseMode::Compact));
    let tool: Arc<dyn Tool> = Arc::new(QueryEngineTool::from_defaults(
        Arc::new(engine),
        TOOL_NAME,
        description,
    ));
    Ok(SubQuestionQueryEngine::new(
        Arc::new(LlmQuestionGenerator::new(question_brain.clone()).with_prefix(QUESTION_PREFIX)),
        vec![tool],
        ctx.synthesizer(ctx.brain()?, ResponseMode::Compact),
    )
    .use_async(true))
}

pub async fn run(ctx: &PipelineContext, custom_extractor: bool) -> anyhow::Result<()> {
    if ctx.load_from_storage {
        warn!("The metadata pipeline always re-extracts; ignoring --load-from-storage");
    }
    let question_brain = ctx.brain_for(&ctx.config.llm.question_model, 0.1, Some(512))?;
    let answer_brain = ctx.brain_for(&ctx.config.llm.answer_model, ctx.config.llm.temperature, None)?;

    let pipeline = IngestionPipeline::new(transformations(ctx, &question_brain, custom_extractor)?);
    let mut nodes = Vec::new();
    for source in &ctx.config.metadata.sources {
        nodes.extend(ingest(ctx, source, &pipeline).await?);
    }
    info!(nodes = nodes.len(), "Extracted metadata");

    let stripped = strip_metadata(&nodes);
    preview("no extra metadata", &stripped);
    let plain = sub_question_engine(
        ctx,
        stripped,
        question_brain.clone(),
        &question_brain,
        "financial information on companies",
    )
    .await?;

    preview("extracted metadata", &nodes);
    let enriched = sub_question_engine(
        ctx,
        nodes,
        answer_brain,
        &question_brain,
        "financial information on companies.",
    )
    .await?;

    for question in &ctx.questions {
        println!("Q : {}", question);
        let response = plain.query(question).await?;
        println!("A (no extra metadata) : {}", response);
        let response = enriched.query(question).await?;
        println!("A (extracted metadata) : {}", response);
        println!();
    }
    Ok(())
}
